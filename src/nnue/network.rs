//! Network weights and the forward pass.
//!
//! The weight file format belongs to the loader; the core only requires
//! contiguous slices with the dimensions below. `from_parts` validates them
//! once so the hot path can index without checks.

use std::error::Error;
use std::fmt;

use crate::board::{Color, Position};

use super::{
    output_bucket, HIDDEN, NUM_FEATURES, NUM_OUTPUT_BUCKETS,
};

/// Quantization of the first layer (clipped-ReLU ceiling).
pub const QA: i32 = 255;
/// Quantization of the output layer.
pub const QB: i32 = 64;
/// Centipawn scale of the raw network output.
pub const SCALE: i32 = 400;

/// Default king-bucket map over the a-d half board (file-major within each
/// rank); 13 buckets, coarser away from the king's home corner. Weight
/// files may override it.
#[rustfmt::skip]
pub const DEFAULT_KING_BUCKETS: [u8; 32] = [
     0,  1,  2,  3,
     4,  5,  6,  7,
     8,  8,  9,  9,
    10, 10, 11, 11,
    12, 12, 12, 12,
    12, 12, 12, 12,
    12, 12, 12, 12,
    12, 12, 12, 12,
];

/// Dimension mismatch in loader-supplied weights.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkDimensionError {
    pub field: &'static str,
    pub expected: usize,
    pub found: usize,
}

impl fmt::Display for NetworkDimensionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "network {} has {} elements, expected {}",
            self.field, self.found, self.expected
        )
    }
}

impl Error for NetworkDimensionError {}

/// NNUE weights in evaluation order.
#[derive(Debug)]
pub struct Network {
    /// Feature transformer, `NUM_FEATURES x HIDDEN`, row-major by feature.
    feature_weights: Vec<i16>,
    /// First-layer bias, `HIDDEN`.
    feature_bias: Vec<i16>,
    /// Output weights per bucket: side-to-move half then opponent half,
    /// `NUM_OUTPUT_BUCKETS x 2 x HIDDEN`.
    output_weights: Vec<i16>,
    /// Output bias per bucket.
    output_bias: Vec<i32>,
    king_buckets: [u8; 32],
}

impl Network {
    /// Assemble a network from loader-supplied slices, checking every
    /// dimension.
    pub fn from_parts(
        feature_weights: Vec<i16>,
        feature_bias: Vec<i16>,
        output_weights: Vec<i16>,
        output_bias: Vec<i32>,
        king_buckets: [u8; 32],
    ) -> Result<Self, NetworkDimensionError> {
        let check = |field: &'static str, expected: usize, found: usize| {
            if expected == found {
                Ok(())
            } else {
                Err(NetworkDimensionError {
                    field,
                    expected,
                    found,
                })
            }
        };
        check(
            "feature weights",
            NUM_FEATURES * HIDDEN,
            feature_weights.len(),
        )?;
        check("feature bias", HIDDEN, feature_bias.len())?;
        check(
            "output weights",
            NUM_OUTPUT_BUCKETS * 2 * HIDDEN,
            output_weights.len(),
        )?;
        check("output bias", NUM_OUTPUT_BUCKETS, output_bias.len())?;

        Ok(Network {
            feature_weights,
            feature_bias,
            output_weights,
            output_bias,
            king_buckets,
        })
    }

    #[inline]
    #[must_use]
    pub fn king_bucket(&self, half_board_index: usize) -> usize {
        self.king_buckets[half_board_index] as usize
    }

    /// One row of the feature transformer.
    #[inline]
    #[must_use]
    pub fn feature_row(&self, feature: usize) -> &[i16] {
        &self.feature_weights[feature * HIDDEN..(feature + 1) * HIDDEN]
    }

    #[inline]
    #[must_use]
    pub fn bias(&self) -> &[i16] {
        &self.feature_bias
    }

    /// Forward pass: clipped-ReLU over both perspective accumulators, dot
    /// with the output bucket's weights, scaled to centipawns from the
    /// side-to-move point of view.
    #[must_use]
    pub fn evaluate(&self, us: &[i16; HIDDEN], them: &[i16; HIDDEN], pos: &Position) -> i32 {
        let bucket = output_bucket(pos);
        let base = bucket * 2 * HIDDEN;
        let us_weights = &self.output_weights[base..base + HIDDEN];
        let them_weights = &self.output_weights[base + HIDDEN..base + 2 * HIDDEN];

        let mut sum = 0i64;
        for i in 0..HIDDEN {
            sum += i64::from(crelu(us[i])) * i64::from(us_weights[i]);
            sum += i64::from(crelu(them[i])) * i64::from(them_weights[i]);
        }
        sum += i64::from(self.output_bias[bucket]);

        (sum * i64::from(SCALE) / i64::from(QA * QB)) as i32
    }
}

#[inline]
fn crelu(v: i16) -> i32 {
    i32::from(v).clamp(0, QA)
}

/// Perspective-relative feature index for one piece.
///
/// `bucket` and `flip` come from the perspective's own-king placement:
/// ranks flip for black, files mirror so the king stays on files a-d.
#[inline]
#[must_use]
pub fn feature_index(
    perspective: Color,
    bucket: usize,
    flip: usize,
    piece_color: Color,
    piece: usize,
    square: usize,
) -> usize {
    let side_offset = if piece_color == perspective { 0 } else { 6 * 64 };
    bucket * 12 * 64 + side_offset + piece * 64 + (square ^ flip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_validates_dimensions() {
        let err = Network::from_parts(
            vec![0; 10],
            vec![0; HIDDEN],
            vec![0; NUM_OUTPUT_BUCKETS * 2 * HIDDEN],
            vec![0; NUM_OUTPUT_BUCKETS],
            DEFAULT_KING_BUCKETS,
        )
        .unwrap_err();
        assert_eq!(err.field, "feature weights");

        let ok = Network::from_parts(
            vec![0; NUM_FEATURES * HIDDEN],
            vec![0; HIDDEN],
            vec![0; NUM_OUTPUT_BUCKETS * 2 * HIDDEN],
            vec![0; NUM_OUTPUT_BUCKETS],
            DEFAULT_KING_BUCKETS,
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_king_bucket_table_shape() {
        assert_eq!(*DEFAULT_KING_BUCKETS.iter().max().unwrap(), 12);
        assert_eq!(DEFAULT_KING_BUCKETS[0], 0);
        // every bucket id appears
        for bucket in 0..=12u8 {
            assert!(DEFAULT_KING_BUCKETS.contains(&bucket));
        }
    }

    #[test]
    fn test_feature_index_layout() {
        use crate::board::Color;
        // own pawn on a1, bucket 0, no flip
        assert_eq!(feature_index(Color::White, 0, 0, Color::White, 0, 0), 0);
        // opponent piece offset
        assert_eq!(
            feature_index(Color::White, 0, 0, Color::Black, 0, 0),
            6 * 64
        );
        // bucket stride
        assert_eq!(
            feature_index(Color::White, 1, 0, Color::White, 0, 0),
            12 * 64
        );
        // flip applies to the square only
        assert_eq!(
            feature_index(Color::White, 0, 56, Color::White, 0, 0),
            56
        );
        assert!(
            feature_index(Color::Black, 12, 56 ^ 7, Color::White, 5, 63) < NUM_FEATURES
        );
    }
}
