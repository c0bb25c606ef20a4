//! Vector index adapters.
//!
//! [`MemoryIndex`] is a brute-force cosine index persisted as JSON, good for the
//! corpus sizes this project deals with. With the `lancedb` feature,
//! [`lance::LanceSegmentIndex`] stores segments in a LanceDB table instead.
//! Both apply the partition filter before ranking, so one partition's hits never
//! displace the other's.

pub mod memory;
#[cfg(feature = "lancedb")]
pub mod lance;

pub use memory::MemoryIndex;

/// Cosine similarity; 0.0 when either side has zero norm.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}
