pub mod journal_repo;
pub mod performance_repo;
pub mod positions_repo;
pub mod suggestions_repo;

pub use journal_repo::JournalRepository;
pub use performance_repo::PerformanceRepository;
pub use positions_repo::PositionsRepository;
pub use suggestions_repo::SuggestionsRepository;
