/// Home win probability from the starting-pitcher quality gap, using a
/// logistic model.
///
/// Model: `P(home_win) = 1 / (1 + exp(-K * adjusted_gap))`
///   - `adjusted_gap = home_score - away_score + HOME_ADVANTAGE`
///   - scores are starter composites on the 0–100 scale
///
/// Calibrated so an even pitching matchup lands near the league-wide home
/// win rate and a 30-point composite gap stays inside realistic single-game
/// probabilities (baseball outcomes are noisy; even great starters lose).

/// Home-field edge expressed in composite-score points.
const HOME_ADVANTAGE: f64 = 3.0;

/// Slope per composite-score point of starter gap.
const K: f64 = 0.018;

/// Probability the home side wins given both starters' composite scores.
/// Returns a probability in (0, 1).
pub fn home_win_probability(home_score: f64, away_score: f64) -> f64 {
    let adjusted_gap = home_score - away_score + HOME_ADVANTAGE;
    1.0 / (1.0 + (-K * adjusted_gap).exp())
}
