pub mod neighbor;
#[cfg(feature = "engine-telea")]
pub mod telea;
