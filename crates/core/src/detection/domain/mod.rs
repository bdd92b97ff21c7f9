pub mod box_smoother;
pub mod face_detector;
