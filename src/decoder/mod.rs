pub mod cache;
pub mod config;
pub mod scorer;
pub mod search;
pub mod state;
pub mod table;

pub use cache::{expand_beams, BeamCache, LayerCache};
pub use config::{DecodeConfig, DecodeError, ScorerError};
pub use scorer::{predict_step, Scorer};
pub use search::{beam_search, BeamSearch, DecodeOutput};
pub use state::{length_penalty, BeamState};
pub use table::{TableModel, TableScorer};
