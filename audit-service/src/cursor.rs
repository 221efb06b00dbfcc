//! 條帶選擇
//!
//! 從指針目錄隨機取一個段，再在段內均勻隨機地選擇一個條帶。
//! 錯誤直接向上返回，不在這裡重試；重試節奏由服務的定時循環決定。

use crate::error::Result;
use crate::pointerdb::PointerDirectory;
use crate::types::{Segment, Stripe};
use rand::Rng;
use std::sync::Arc;
use tracing::debug;

pub struct Cursor {
    pointers: Arc<dyn PointerDirectory>,
}

impl Cursor {
    pub fn new(pointers: Arc<dyn PointerDirectory>) -> Self {
        Self { pointers }
    }

    /// 選出下一個要審計的條帶
    ///
    /// 返回的段至少有一個 piece，索引一定在 `[0, stripe_count)` 內
    pub async fn next_stripe(&self) -> Result<Stripe> {
        let segment = self.pointers.random_segment().await?;
        let index = pick_stripe(&segment, &mut rand::thread_rng())?;

        debug!(
            path = %segment.path,
            stripe = index,
            stripe_count = segment.stripe_count(),
            pieces = segment.pieces.len(),
            "Selected stripe for audit"
        );

        Ok(Stripe { index, segment })
    }

    pub(crate) fn pointers(&self) -> &Arc<dyn PointerDirectory> {
        &self.pointers
    }
}

fn pick_stripe<R: Rng + ?Sized>(segment: &Segment, rng: &mut R) -> Result<u64> {
    // validate() 保證 size > 0 且 stripe_size > 0，因此 stripe_count >= 1
    segment.validate()?;
    Ok(rng.gen_range(0..segment.stripe_count()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuditError;
    use crate::types::{ErasureScheme, NodeId, PieceRef};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn segment(size: u64, stripe_size: u64) -> Segment {
        Segment {
            path: "s0".to_string(),
            piece_id: "root".to_string(),
            size,
            erasure: ErasureScheme {
                stripe_size,
                required: 1,
                total: 1,
            },
            pieces: vec![PieceRef {
                node_id: NodeId::new("a"),
                piece_num: 0,
                piece_root: hex::encode([0u8; 32]),
            }],
        }
    }

    #[test]
    fn test_indices_cover_whole_range() {
        let seg = segment(10 * 256, 256);
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = HashSet::new();

        for _ in 0..2000 {
            let index = pick_stripe(&seg, &mut rng).unwrap();
            assert!(index < 10);
            seen.insert(index);
        }
        assert_eq!(seen.len(), 10);
    }

    #[test]
    fn test_partial_last_stripe_is_selectable() {
        let seg = segment(1025, 1024);
        let mut rng = StdRng::seed_from_u64(1);
        let seen: HashSet<u64> = (0..500)
            .map(|_| pick_stripe(&seg, &mut rng).unwrap())
            .collect();
        assert_eq!(seen, HashSet::from([0, 1]));
    }

    #[test]
    fn test_segment_without_pieces_is_rejected() {
        let mut seg = segment(1024, 1024);
        seg.pieces.clear();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            pick_stripe(&seg, &mut rng),
            Err(AuditError::InvalidSegment(_))
        ));
    }
}
