pub mod keypoint;
pub mod lift;
pub mod source;
pub mod trajectory;

pub use keypoint::{Keypoint, KeypointIndex, Pose};
pub use lift::{PerspectiveLifter, PoseLifter};
pub use source::{JsonPoseSource, PoseSource};
pub use trajectory::{Trajectory, TrajectoryView};
