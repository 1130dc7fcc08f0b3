pub mod evaluator;
pub mod kelly;
pub mod matcher;
pub mod merger;
pub mod normalizer;
pub mod win_prob;
