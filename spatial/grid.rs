use super::SpatialError;
use crate::types::{BoundingBox, Coordinates};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// `count` points drawn uniformly in longitude and latitude inside `bbox`. The same seed
/// always yields the same grid.
pub fn sample_grid(
    bbox: &BoundingBox,
    count: usize,
    seed: u64,
) -> Result<Vec<Coordinates>, SpatialError> {
    if !bbox.is_valid() {
        return Err(SpatialError::InvalidBoundingBox(*bbox));
    }
    if count == 0 {
        return Err(SpatialError::EmptyGrid);
    }
    let mut rng = StdRng::seed_from_u64(seed);
    Ok((0..count)
        .map(|_| Coordinates {
            lng: rng.gen_range(bbox.min_lng..bbox.max_lng),
            lat: rng.gen_range(bbox.min_lat..bbox.max_lat),
        })
        .collect())
}
