pub mod localization;

pub use localization::ParticleLocalizer;
