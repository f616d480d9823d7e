pub mod achievement;
pub mod base;

pub use achievement::AchievementDao;
pub use base::BaseDao;
