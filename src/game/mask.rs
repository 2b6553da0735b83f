//! Occupancy masks
//!
//! Each visual variant's sprite is reduced to a square binary grid. Only
//! confidently opaque pixels are solid so anti-aliased fringes never
//! register hits. Masks are immutable once built and shared through
//! `Arc`; entities hold a variant key and look the mask up per test.
//!
//! Sprites face -X in their native orientation. A pose rotates the grid
//! by `angle - PI` and mirrors it vertically whenever the entity faces the
//! right half-plane, so fins stay on top regardless of heading.

use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use bitvec::prelude::*;
use crossbeam_channel::{unbounded, Receiver, Sender};
use hashbrown::{HashMap, HashSet};
use image::imageops::FilterType;
use tracing::{debug, info, warn};

use crate::config::MaskConfig;
use crate::game::constants::mask::{FALLBACK_SEMI_MAJOR, FALLBACK_SEMI_MINOR};
use crate::util::vec2::Vec2;

#[derive(Debug, thiserror::Error)]
pub enum MaskError {
    #[error("failed to decode {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("mask '{0}' has no solid cells")]
    Empty(String),
}

/// Binary occupancy grid with derived anchors and outline samples.
///
/// Local coordinates are in cells, measured from the grid centre.
#[derive(Debug, Clone)]
pub struct OccupancyMask {
    resolution: usize,
    cells: BitVec,
    front_anchor: Vec2,
    rear_anchor: Vec2,
    outline: Vec<Vec2>,
}

impl OccupancyMask {
    /// Build from a row-major grid. Fails if no cell is solid.
    pub fn from_cells(
        name: &str,
        resolution: usize,
        cells: BitVec,
        outline_stride: usize,
    ) -> Result<Self, MaskError> {
        debug_assert_eq!(cells.len(), resolution * resolution);
        if cells.not_any() {
            return Err(MaskError::Empty(name.to_string()));
        }

        let mut mask = Self {
            resolution,
            cells,
            front_anchor: Vec2::ZERO,
            rear_anchor: Vec2::ZERO,
            outline: Vec::new(),
        };
        mask.front_anchor = mask.extreme_column_anchor(true);
        mask.rear_anchor = mask.extreme_column_anchor(false);
        mask.outline = mask.collect_outline(outline_stride.max(1));
        Ok(mask)
    }

    /// Build from any alpha source sampled at `resolution`×`resolution`
    pub fn from_alpha<F>(name: &str, config: &MaskConfig, alpha: F) -> Result<Self, MaskError>
    where
        F: Fn(u32, u32) -> u8,
    {
        let res = config.resolution;
        let mut cells = bitvec![0; res * res];
        for y in 0..res {
            for x in 0..res {
                if alpha(x as u32, y as u32) > config.alpha_threshold {
                    cells.set(y * res + x, true);
                }
            }
        }
        Self::from_cells(name, res, cells, config.outline_stride)
    }

    /// Decode a sprite and reduce it to a grid (nearest-neighbour resample)
    pub fn from_image(path: &Path, config: &MaskConfig) -> Result<Self, MaskError> {
        let image = image::open(path)
            .map_err(|source| MaskError::Image {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();
        let res = config.resolution as u32;
        let resized = image::imageops::resize(&image, res, res, FilterType::Nearest);
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_alpha(&name, config, |x, y| resized.get_pixel(x, y)[3])
    }

    /// Procedural ellipse elongated along X, used when no sprite is available
    pub fn ellipse(config: &MaskConfig) -> Self {
        let res = config.resolution;
        let half = res as f32 / 2.0;
        let a = FALLBACK_SEMI_MAJOR * res as f32;
        let b = FALLBACK_SEMI_MINOR * res as f32;
        let mut cells = bitvec![0; res * res];
        for y in 0..res {
            for x in 0..res {
                let dx = (x as f32 + 0.5 - half) / a;
                let dy = (y as f32 + 0.5 - half) / b;
                if dx * dx + dy * dy <= 1.0 {
                    cells.set(y * res + x, true);
                }
            }
        }
        Self::from_cells("ellipse", res, cells, config.outline_stride)
            .unwrap_or_else(|_| Self::single_cell(res))
    }

    fn single_cell(resolution: usize) -> Self {
        let res = resolution.max(1);
        let mut cells = bitvec![0; res * res];
        cells.set((res / 2) * res + res / 2, true);
        Self {
            resolution: res,
            cells,
            front_anchor: Vec2::ZERO,
            rear_anchor: Vec2::ZERO,
            outline: vec![Vec2::new(0.5, 0.5)],
        }
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn front_anchor(&self) -> Vec2 {
        self.front_anchor
    }

    pub fn rear_anchor(&self) -> Vec2 {
        self.rear_anchor
    }

    pub fn outline(&self) -> &[Vec2] {
        &self.outline
    }

    pub fn solid_count(&self) -> usize {
        self.cells.count_ones()
    }

    #[inline]
    pub fn is_solid(&self, x: i32, y: i32) -> bool {
        let res = self.resolution as i32;
        if x < 0 || y < 0 || x >= res || y >= res {
            return false;
        }
        self.cells[(y * res + x) as usize]
    }

    /// Radius (in cells) of the circle enclosing the whole grid
    pub fn bounding_radius(&self) -> f32 {
        self.resolution as f32 * std::f32::consts::FRAC_1_SQRT_2
    }

    fn cell_center(&self, x: usize, y: usize) -> Vec2 {
        let half = self.resolution as f32 / 2.0;
        Vec2::new(x as f32 + 0.5 - half, y as f32 + 0.5 - half)
    }

    /// Solid cell in the min-X (front) or max-X (rear) column, median row
    fn extreme_column_anchor(&self, front: bool) -> Vec2 {
        let res = self.resolution;
        let columns: Box<dyn Iterator<Item = usize>> = if front {
            Box::new(0..res)
        } else {
            Box::new((0..res).rev())
        };
        for x in columns {
            let rows: Vec<usize> = (0..res).filter(|&y| self.cells[y * res + x]).collect();
            if !rows.is_empty() {
                return self.cell_center(x, rows[rows.len() / 2]);
            }
        }
        Vec2::ZERO
    }

    /// Solid cells with an empty 4-neighbour, thinned by `stride`
    fn collect_outline(&self, stride: usize) -> Vec<Vec2> {
        let res = self.resolution;
        let mut outline = Vec::new();
        let mut seen = 0usize;
        for idx in self.cells.iter_ones() {
            let (x, y) = ((idx % res) as i32, (idx / res) as i32);
            let boundary = !self.is_solid(x - 1, y)
                || !self.is_solid(x + 1, y)
                || !self.is_solid(x, y - 1)
                || !self.is_solid(x, y + 1);
            if boundary {
                if seen % stride == 0 {
                    outline.push(self.cell_center(x as usize, y as usize));
                }
                seen += 1;
            }
        }
        outline
    }

    /// Point test in local cell space with a `radius`-cell neighbourhood
    pub fn contains_local(&self, local: Vec2, radius: i32) -> bool {
        let half = self.resolution as f32 / 2.0;
        let cx = (local.x + half).floor() as i32;
        let cy = (local.y + half).floor() as i32;
        (-radius..=radius).any(|dy| (-radius..=radius).any(|dx| self.is_solid(cx + dx, cy + dy)))
    }

    /// Point test in world space under `pose`
    pub fn contains_point(&self, pose: &Pose, world: Vec2, radius: i32) -> bool {
        self.contains_local(pose.to_local(world), radius)
    }

    /// Packed row-major bits (LSB first) for debug overlays
    pub fn packed_bits(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.cells.len().div_ceil(8)];
        for idx in self.cells.iter_ones() {
            out[idx / 8] |= 1 << (idx % 8);
        }
        out
    }
}

/// World placement of a mask
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub center: Vec2,
    pub angle: f32,
    /// World units per cell
    pub scale: f32,
    pub flipped: bool,
}

impl Pose {
    pub fn new(center: Vec2, angle: f32, footprint: f32, resolution: usize) -> Self {
        Self {
            center,
            angle,
            scale: footprint / resolution.max(1) as f32,
            flipped: angle.cos() > 0.0,
        }
    }

    pub fn to_world(&self, local: Vec2) -> Vec2 {
        let mut p = local * self.scale;
        if self.flipped {
            p.y = -p.y;
        }
        self.center + p.rotate(self.angle - PI)
    }

    pub fn to_local(&self, world: Vec2) -> Vec2 {
        let mut p = (world - self.center).rotate(PI - self.angle);
        if self.flipped {
            p.y = -p.y;
        }
        p * (1.0 / self.scale)
    }
}

/// Shape overlap between two posed masks.
///
/// Outline samples of each mask are tested against the other, so swapping
/// the arguments yields the same answer.
pub fn overlaps(a: &OccupancyMask, pa: &Pose, b: &OccupancyMask, pb: &Pose, radius: i32) -> bool {
    let reach = a.bounding_radius() * pa.scale + b.bounding_radius() * pb.scale;
    if pa.center.distance_sq_to(pb.center) > reach * reach {
        return false;
    }
    a.outline()
        .iter()
        .any(|&p| b.contains_point(pb, pa.to_world(p), radius))
        || b
            .outline()
            .iter()
            .any(|&p| a.contains_point(pa, pb.to_world(p), radius))
}

type LoadResult = (String, Result<OccupancyMask, MaskError>);

struct MaskLoader {
    requests: Sender<String>,
    results: Receiver<LoadResult>,
}

impl MaskLoader {
    fn spawn(asset_dir: PathBuf, config: MaskConfig) -> Option<Self> {
        let (request_tx, request_rx) = unbounded::<String>();
        let (result_tx, result_rx) = unbounded::<LoadResult>();
        let spawned = thread::Builder::new()
            .name("mask-loader".into())
            .spawn(move || {
                for key in request_rx.iter() {
                    let path = mask_path(&asset_dir, &key);
                    let result = OccupancyMask::from_image(&path, &config);
                    if result_tx.send((key, result)).is_err() {
                        break;
                    }
                }
            });
        match spawned {
            Ok(_) => Some(Self {
                requests: request_tx,
                results: result_rx,
            }),
            Err(e) => {
                warn!("Failed to start mask loader thread: {}", e);
                None
            }
        }
    }
}

fn mask_path(asset_dir: &Path, key: &str) -> PathBuf {
    asset_dir.join(format!("{key}.png"))
}

/// Process-lifetime cache of masks keyed by variant.
///
/// Lookups never block: a missing key resolves to the last known-good mask
/// until a background load lands.
pub struct MaskLibrary {
    config: MaskConfig,
    asset_dir: Option<PathBuf>,
    resident: HashMap<String, Arc<OccupancyMask>>,
    fallback: Arc<OccupancyMask>,
    pending: HashSet<String>,
    failed: HashSet<String>,
    loader: Option<MaskLoader>,
}

impl MaskLibrary {
    /// Library with no sprite assets; every key resolves to the ellipse
    pub fn procedural(config: MaskConfig) -> Self {
        Self {
            config,
            asset_dir: None,
            resident: HashMap::new(),
            fallback: Arc::new(OccupancyMask::ellipse(&config)),
            pending: HashSet::new(),
            failed: HashSet::new(),
            loader: None,
        }
    }

    /// Library backed by `<asset_dir>/<key>.png` with a background loader
    pub fn with_assets(asset_dir: impl Into<PathBuf>, config: MaskConfig) -> Self {
        let asset_dir = asset_dir.into();
        let loader = MaskLoader::spawn(asset_dir.clone(), config);
        Self {
            asset_dir: Some(asset_dir),
            loader,
            ..Self::procedural(config)
        }
    }

    pub fn config(&self) -> &MaskConfig {
        &self.config
    }

    /// Blocking load of `keys`, for use before the first tick
    pub fn preload(&mut self, keys: &[&str]) {
        let Some(dir) = self.asset_dir.clone() else {
            return;
        };
        for key in keys {
            let result = OccupancyMask::from_image(&mask_path(&dir, key), &self.config);
            self.accept(key, result);
        }
        info!(
            "Preloaded {}/{} masks from {}",
            self.resident.len(),
            keys.len(),
            dir.display()
        );
    }

    /// Insert a mask directly, making it the known-good fallback
    pub fn insert(&mut self, key: &str, mask: OccupancyMask) {
        let mask = Arc::new(mask);
        self.fallback = mask.clone();
        self.pending.remove(key);
        self.failed.remove(key);
        self.resident.insert(key.to_string(), mask);
    }

    fn accept(&mut self, key: &str, result: Result<OccupancyMask, MaskError>) -> bool {
        self.pending.remove(key);
        match result {
            Ok(mask) => {
                debug!("Loaded mask '{}' ({} solid cells)", key, mask.solid_count());
                self.insert(key, mask);
                true
            }
            Err(e) => {
                warn!("Mask '{}' unavailable, using fallback geometry: {}", key, e);
                self.failed.insert(key.to_string());
                false
            }
        }
    }

    /// True if `key` is resident; otherwise queues a background load
    pub fn ensure(&mut self, key: &str) -> bool {
        if self.resident.contains_key(key) {
            return true;
        }
        if self.pending.contains(key) || self.failed.contains(key) {
            return false;
        }
        if let Some(loader) = &self.loader {
            if loader.requests.send(key.to_string()).is_ok() {
                self.pending.insert(key.to_string());
            }
        }
        false
    }

    /// Collect finished background loads; returns keys that became resident
    pub fn drain_completed(&mut self) -> Vec<String> {
        let finished: Vec<LoadResult> = match &self.loader {
            Some(loader) => loader.results.try_iter().collect(),
            None => return Vec::new(),
        };
        finished
            .into_iter()
            .filter_map(|(key, result)| self.accept(&key, result).then_some(key))
            .collect()
    }

    /// Mask for `key`, or the fallback when it is not resident
    pub fn get(&self, key: &str) -> &OccupancyMask {
        self.resident
            .get(key)
            .map(|m| m.as_ref())
            .unwrap_or(self.fallback.as_ref())
    }

    pub fn is_resident(&self, key: &str) -> bool {
        self.resident.contains_key(key)
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains(key)
    }

    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn small_config() -> MaskConfig {
        MaskConfig {
            resolution: 32,
            ..MaskConfig::default()
        }
    }

    /// Only the upper half of the grid is solid
    fn top_half_mask(config: &MaskConfig) -> OccupancyMask {
        let res = config.resolution as u32;
        OccupancyMask::from_alpha("top", config, |_, y| if y < res / 2 { 255 } else { 0 }).unwrap()
    }

    fn temp_png(name: &str, width: u32, height: u32, solid: impl Fn(u32, u32) -> bool) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("shoal-masks-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut img = image::RgbaImage::new(width, height);
        for (x, y, px) in img.enumerate_pixels_mut() {
            let alpha = if solid(x, y) { 255 } else { 0 };
            *px = image::Rgba([200, 120, 40, alpha]);
        }
        let path = dir.join(format!("{name}.png"));
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_alpha_threshold_is_strict() {
        let config = small_config();
        let mask = OccupancyMask::from_alpha("t", &config, |x, _| if x < 16 { 200 } else { 201 }).unwrap();
        assert!(!mask.is_solid(0, 0));
        assert!(mask.is_solid(16, 0));
        assert_eq!(mask.solid_count(), 16 * 32);
    }

    #[test]
    fn test_empty_grid_rejected() {
        let config = small_config();
        let result = OccupancyMask::from_alpha("clear", &config, |_, _| 0);
        assert!(matches!(result, Err(MaskError::Empty(_))));
    }

    #[test]
    fn test_ellipse_anchors_on_axis() {
        let config = MaskConfig::default();
        let mask = OccupancyMask::ellipse(&config);
        let res = config.resolution as f32;
        let front = mask.front_anchor();
        let rear = mask.rear_anchor();
        assert!(front.x < -0.4 * res, "front {:?}", front);
        assert!(rear.x > 0.4 * res, "rear {:?}", rear);
        assert!(front.y.abs() <= 1.0);
        assert!(rear.y.abs() <= 1.0);
    }

    #[test]
    fn test_anchor_uses_median_row() {
        let config = small_config();
        // Leftmost column solid on rows 4..=10
        let mask = OccupancyMask::from_alpha("bar", &config, |x, y| {
            if (x == 2 && (4..=10).contains(&y)) || (x > 2 && x < 20 && y == 7) {
                255
            } else {
                0
            }
        })
        .unwrap();
        let front = mask.front_anchor();
        assert_eq!(front, Vec2::new(2.5 - 16.0, 7.5 - 16.0));
    }

    #[test]
    fn test_outline_only_boundary_cells() {
        let config = MaskConfig {
            outline_stride: 1,
            ..small_config()
        };
        let mask = OccupancyMask::from_alpha("block", &config, |x, y| {
            if (8..24).contains(&x) && (8..24).contains(&y) { 255 } else { 0 }
        })
        .unwrap();
        // 16x16 block has 60 boundary cells
        assert_eq!(mask.outline().len(), 60);
        assert!(mask.outline().iter().all(|p| p.x.abs() > 6.0 || p.y.abs() > 6.0));
    }

    #[test]
    fn test_pose_round_trip() {
        for &angle in &[0.0f32, 0.7, 1.6, PI, -2.2, 4.0] {
            let pose = Pose::new(Vec2::new(500.0, 300.0), angle, 96.0, 64);
            let local = Vec2::new(-12.0, 5.5);
            let back = pose.to_local(pose.to_world(local));
            assert!(back.distance_to(local) < 1e-3, "angle {angle}: {back:?}");
        }
    }

    #[test]
    fn test_front_anchor_follows_facing() {
        let config = MaskConfig::default();
        let mask = OccupancyMask::ellipse(&config);
        let center = Vec2::new(1000.0, 1000.0);

        let right = Pose::new(center, 0.0, 64.0, config.resolution);
        assert!(right.to_world(mask.front_anchor()).x > center.x + 25.0);

        let left = Pose::new(center, PI, 64.0, config.resolution);
        assert!(left.to_world(mask.front_anchor()).x < center.x - 25.0);

        let down = Pose::new(center, PI / 2.0, 64.0, config.resolution);
        assert!(down.to_world(mask.front_anchor()).y > center.y + 25.0);
    }

    #[test]
    fn test_flip_keeps_top_on_top() {
        let config = small_config();
        let mask = top_half_mask(&config);
        let center = Vec2::new(100.0, 100.0);
        for &angle in &[0.0f32, PI] {
            let pose = Pose::new(center, angle, 32.0, config.resolution);
            assert!(mask.contains_point(&pose, center + Vec2::new(0.0, -8.0), 0), "angle {angle}");
            assert!(!mask.contains_point(&pose, center + Vec2::new(0.0, 8.0), 0), "angle {angle}");
        }
    }

    #[test]
    fn test_neighbourhood_sampling_tolerates_rounding() {
        let config = small_config();
        let mask = top_half_mask(&config);
        let pose = Pose::new(Vec2::ZERO, PI, 32.0, config.resolution);
        // Half a cell below the solid edge
        let probe = Vec2::new(0.0, 0.5);
        assert!(!mask.contains_point(&pose, probe, 0));
        assert!(mask.contains_point(&pose, probe, 1));
    }

    #[test]
    fn test_overlap_coincident_and_distant() {
        let config = MaskConfig::default();
        let mask = OccupancyMask::ellipse(&config);
        let a = Pose::new(Vec2::new(200.0, 200.0), 0.3, 64.0, config.resolution);
        let b = Pose::new(Vec2::new(210.0, 205.0), 2.0, 64.0, config.resolution);
        let far = Pose::new(Vec2::new(900.0, 200.0), 2.0, 64.0, config.resolution);
        assert!(overlaps(&mask, &a, &mask, &b, 1));
        assert!(!overlaps(&mask, &a, &mask, &far, 1));
    }

    #[test]
    fn test_overlap_respects_shape_not_circle() {
        let config = MaskConfig::default();
        let mask = OccupancyMask::ellipse(&config);
        // Two horizontal ellipses stacked vertically: circles would collide
        // (radius 32 each, 45 apart) but the thin shapes do not.
        let a = Pose::new(Vec2::new(0.0, 0.0), PI, 64.0, config.resolution);
        let b = Pose::new(Vec2::new(0.0, 45.0), PI, 64.0, config.resolution);
        assert!(!overlaps(&mask, &a, &mask, &b, 1));
    }

    #[test]
    fn test_overlap_symmetric() {
        use rand::Rng;
        let config = MaskConfig::default();
        let ellipse = OccupancyMask::ellipse(&config);
        let top = top_half_mask(&config);
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let pa = Pose::new(
                Vec2::new(rng.gen_range(0.0..120.0), rng.gen_range(0.0..120.0)),
                rng.gen_range(-PI..PI),
                rng.gen_range(40.0..120.0),
                config.resolution,
            );
            let pb = Pose::new(
                Vec2::new(rng.gen_range(0.0..120.0), rng.gen_range(0.0..120.0)),
                rng.gen_range(-PI..PI),
                rng.gen_range(40.0..120.0),
                config.resolution,
            );
            assert_eq!(
                overlaps(&ellipse, &pa, &top, &pb, 1),
                overlaps(&top, &pb, &ellipse, &pa, 1)
            );
        }
    }

    #[test]
    fn test_from_image_resamples_to_resolution() {
        let config = small_config();
        // 64x64 sprite, left half opaque
        let path = temp_png("half", 64, 64, |x, _| x < 32);
        let mask = OccupancyMask::from_image(&path, &config).unwrap();
        assert_eq!(mask.resolution(), 32);
        assert_eq!(mask.solid_count(), 16 * 32);
        assert!(mask.is_solid(0, 31));
        assert!(!mask.is_solid(31, 0));
    }

    #[test]
    fn test_from_image_missing_file() {
        let result = OccupancyMask::from_image(Path::new("/nonexistent/pike.png"), &small_config());
        assert!(matches!(result, Err(MaskError::Image { .. })));
    }

    #[test]
    fn test_library_falls_back_for_unknown_key() {
        let library = MaskLibrary::procedural(small_config());
        let mask = library.get("shark");
        assert!(mask.solid_count() > 0);
        assert!(!library.is_resident("shark"));
    }

    #[test]
    fn test_library_preload_and_known_good_fallback() {
        let config = small_config();
        let path = temp_png("perch", 32, 32, |_, y| y < 10);
        let dir = path.parent().unwrap().to_path_buf();
        let mut library = MaskLibrary::with_assets(&dir, config);
        library.preload(&["perch", "missing"]);
        assert!(library.is_resident("perch"));
        assert!(!library.is_resident("missing"));
        // Missing key resolves to the last good load, not the ellipse
        assert_eq!(library.get("missing").solid_count(), library.get("perch").solid_count());
    }

    #[test]
    fn test_library_background_load() {
        let config = small_config();
        let path = temp_png("pike", 32, 32, |x, _| x > 4);
        let dir = path.parent().unwrap().to_path_buf();
        let mut library = MaskLibrary::with_assets(&dir, config);

        assert!(!library.ensure("pike"));
        assert!(library.is_pending("pike"));

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut loaded = Vec::new();
        while loaded.is_empty() && Instant::now() < deadline {
            loaded = library.drain_completed();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(loaded, vec!["pike".to_string()]);
        assert!(library.ensure("pike"));
        assert!(!library.is_pending("pike"));
    }

    #[test]
    fn test_library_failed_load_not_retried() {
        let dir = std::env::temp_dir().join(format!("shoal-empty-{}", uuid::Uuid::new_v4()));
        let mut library = MaskLibrary::with_assets(&dir, small_config());
        library.ensure("ghost");
        let deadline = Instant::now() + Duration::from_secs(5);
        while library.is_pending("ghost") && Instant::now() < deadline {
            library.drain_completed();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!library.is_pending("ghost"));
        assert!(!library.ensure("ghost"));
        assert!(!library.is_pending("ghost"));
    }

    #[test]
    fn test_packed_bits_length() {
        let config = small_config();
        let mask = top_half_mask(&config);
        let bits = mask.packed_bits();
        assert_eq!(bits.len(), 32 * 32 / 8);
        assert_eq!(bits.iter().map(|b| b.count_ones() as usize).sum::<usize>(), mask.solid_count());
    }
}
