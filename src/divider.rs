use rand::seq::SliceRandom;

use crate::karma::members::Member;
use crate::store::StoreError;

/// One randomly assembled sub-group. The color is borrowed from one of its
/// members so rendered chunks stay visually distinct.
#[derive(Debug, Clone)]
pub struct SubGroup {
    pub color: String,
    pub members: Vec<Member>,
}

/// Shuffle the members and deal them into chunks of `size`. The last chunk
/// takes the remainder, so it may run short.
pub fn split(mut members: Vec<Member>, size: usize) -> Result<Vec<SubGroup>, StoreError> {
    if size == 0 {
        return Err(StoreError::validation("sub-group size must be at least 1"));
    }
    let mut rng = rand::thread_rng();
    members.shuffle(&mut rng);

    let mut sub_groups = Vec::with_capacity(members.len().div_ceil(size));
    for chunk in members.chunks(size) {
        let color = chunk
            .choose(&mut rng)
            .map(|m| m.color.clone())
            .unwrap_or_default();
        sub_groups.push(SubGroup {
            color,
            members: chunk.to_vec(),
        });
    }
    Ok(sub_groups)
}
