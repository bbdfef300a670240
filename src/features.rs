//! Fixed-length feature vectors for cost predictors.
//!
//! A predictor sees an architecture only through these ten counts. They are
//! read through the per-block accessor, so opaque blocks count toward depth
//! and nothing else.

use serde::Serialize;

use crate::ir::{Architecture, OperatorBlock, Padding};

/// Number of entries in [`FeatureVector::to_array`].
pub const FEATURE_COUNT: usize = 10;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FeatureVector {
    pub depth: usize,
    pub convs: usize,
    pub max_conv_out_channels: usize,
    pub relus: usize,
    pub max_pools: usize,
    pub avg_pools: usize,
    pub linears: usize,
    pub max_linear_out_features: usize,
    /// Convs with "same" padding.
    pub same_padded: usize,
    /// Sum of explicit conv paddings.
    pub explicit_padding: usize,
}

impl FeatureVector {
    /// Entries in predictor column order.
    pub fn to_array(&self) -> [usize; FEATURE_COUNT] {
        [
            self.depth,
            self.convs,
            self.max_conv_out_channels,
            self.relus,
            self.max_pools,
            self.avg_pools,
            self.linears,
            self.max_linear_out_features,
            self.same_padded,
            self.explicit_padding,
        ]
    }
}

pub fn featurize(architecture: &Architecture) -> FeatureVector {
    let mut v = FeatureVector {
        depth: architecture.len(),
        ..FeatureVector::default()
    };
    for block in architecture {
        match block {
            OperatorBlock::Conv(p) => {
                v.convs += 1;
                v.max_conv_out_channels = v.max_conv_out_channels.max(p.out_channels());
                match p.padding() {
                    Padding::Same => v.same_padded += 1,
                    Padding::Explicit(pad) => v.explicit_padding += pad,
                }
            }
            OperatorBlock::Relu => v.relus += 1,
            OperatorBlock::MaxPool(_) => v.max_pools += 1,
            OperatorBlock::GlobalAvgPool => v.avg_pools += 1,
            OperatorBlock::Linear(p) => {
                v.linears += 1;
                v.max_linear_out_features = v.max_linear_out_features.max(p.out_features());
            }
            OperatorBlock::Flatten(_) | OperatorBlock::Opaque(_) => {}
        }
    }
    v
}
