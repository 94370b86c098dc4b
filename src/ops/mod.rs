pub mod blur;
pub mod effects;
