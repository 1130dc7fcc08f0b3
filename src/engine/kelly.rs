//! Fractional Kelly criterion stake sizing for moneyline bets.

/// Compute the recommended stake for one bet.
///
/// - `win_probability`: model probability the bet wins, in (0, 1)
/// - `decimal_odds`: decimal payout odds (e.g. 1.91 for -110)
/// - `bankroll`: available balance in dollars
/// - `max_fraction`: cap on the bankroll fraction risked (e.g. 0.25)
///
/// `f* = (b*p - q) / b` with `b = decimal_odds - 1`. A non-positive Kelly
/// fraction means no edge: the stake is 0.0 rather than a forced minimum.
pub fn kelly_stake(
    win_probability: f64,
    decimal_odds: f64,
    bankroll: f64,
    max_fraction: f64,
) -> f64 {
    if !(0.0..=1.0).contains(&win_probability)
        || decimal_odds <= 1.0
        || bankroll <= 0.0
        || max_fraction <= 0.0
    {
        return 0.0;
    }

    let b = decimal_odds - 1.0;
    let p = win_probability;
    let q = 1.0 - p;

    // f* = (b*p - q) / b
    let f_star = (b * p - q) / b;
    if f_star <= 0.0 {
        return 0.0;
    }

    let fraction = f_star.min(max_fraction);
    bankroll * fraction
}

/// Convert American odds to decimal odds.
/// +150 -> 2.50, -150 -> 1.667.
pub fn american_to_decimal(odds: f64) -> f64 {
    if odds > 0.0 {
        1.0 + odds / 100.0
    } else if odds < 0.0 {
        1.0 + 100.0 / odds.abs()
    } else {
        1.0
    }
}
