/// Default learning rate for trainable edges and nodes
pub const DEFAULT_ETA: f32 = 0.01;
/// Default momentum for SGD updates
pub const DEFAULT_MOMENTUM: f32 = 0.0;
/// Default L2 weight decay
pub const DEFAULT_WEIGHT_DECAY: f32 = 0.0;
/// Fallback worker count when available parallelism cannot be detected
pub const FALLBACK_WORKERS: usize = 4;
/// Prefix for scheduler worker thread names
pub const DEFAULT_THREAD_NAME: &str = "cubegraph-worker";
/// Default number of synthetic samples generated by the demo driver
pub const DEFAULT_SAMPLES: usize = 4;
