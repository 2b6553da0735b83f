pub mod combat;
pub mod feeding;
pub mod movement;
pub mod steering;
