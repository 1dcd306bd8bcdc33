pub mod channel;
pub mod color_balancer;
pub mod contrast_enhancer;
pub mod fusion;
pub mod perceptual;
pub mod red_channel;
pub mod utils;
