pub mod model;
pub mod user;

pub use model::{ModelRecord, PredictionOutcome, TrainOutcome, TrainingSpec};
pub use user::User;
