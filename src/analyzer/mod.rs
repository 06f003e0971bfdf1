mod motion;

pub use motion::MotionFilter;
