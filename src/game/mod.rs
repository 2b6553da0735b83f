pub mod abilities;
pub mod constants;
pub mod dispatch;
pub mod game_loop;
pub mod ledger;
pub mod mask;
pub mod performance;
pub mod progression;
pub mod state;
pub mod systems;
