//! CNN models for lesion images.

mod lesion_net;

pub use lesion_net::{ConvBlock, LesionNet, LesionNetConfig};
