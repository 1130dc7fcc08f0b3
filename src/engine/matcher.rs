use chrono::NaiveDate;

/// Identity normalization for cross-source joins. Schedule, odds, and stat
/// sources spell teams and players differently; everything is reduced to a
/// canonical form before exact-match lookup.

/// One game's join key: date plus normalized home/away codes.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct GameKey {
    pub date: NaiveDate,
    pub home: String,
    pub away: String,
}

pub fn game_key(date: NaiveDate, home: &str, away: &str) -> GameKey {
    GameKey {
        date,
        home: normalize_team(home),
        away: normalize_team(away),
    }
}

/// Look up a team's canonical code by full name.
/// Returns None for strings that are already codes or unknown spellings.
fn team_code(name: &str) -> Option<&'static str> {
    let upper = name.to_uppercase();
    match upper.trim() {
        "ARIZONA DIAMONDBACKS" | "ARIZONA" => Some("ARI"),
        "ATLANTA BRAVES" | "ATLANTA" => Some("ATL"),
        "BALTIMORE ORIOLES" | "BALTIMORE" => Some("BAL"),
        "BOSTON RED SOX" | "BOSTON" => Some("BOS"),
        "CHICAGO CUBS" => Some("CHC"),
        "CHICAGO WHITE SOX" => Some("CWS"),
        "CINCINNATI REDS" | "CINCINNATI" => Some("CIN"),
        "CLEVELAND GUARDIANS" | "CLEVELAND" => Some("CLE"),
        "COLORADO ROCKIES" | "COLORADO" => Some("COL"),
        "DETROIT TIGERS" | "DETROIT" => Some("DET"),
        "HOUSTON ASTROS" | "HOUSTON" => Some("HOU"),
        "KANSAS CITY ROYALS" | "KANSAS CITY" => Some("KC"),
        "LOS ANGELES ANGELS" | "LA ANGELS" => Some("LAA"),
        "LOS ANGELES DODGERS" | "LA DODGERS" => Some("LAD"),
        "MIAMI MARLINS" | "MIAMI" => Some("MIA"),
        "MILWAUKEE BREWERS" | "MILWAUKEE" => Some("MIL"),
        "MINNESOTA TWINS" | "MINNESOTA" => Some("MIN"),
        "NEW YORK METS" | "NY METS" => Some("NYM"),
        "NEW YORK YANKEES" | "NY YANKEES" => Some("NYY"),
        "OAKLAND ATHLETICS" | "OAKLAND" | "ATHLETICS" => Some("OAK"),
        "PHILADELPHIA PHILLIES" | "PHILADELPHIA" => Some("PHI"),
        "PITTSBURGH PIRATES" | "PITTSBURGH" => Some("PIT"),
        "SAN DIEGO PADRES" | "SAN DIEGO" => Some("SD"),
        "SAN FRANCISCO GIANTS" | "SAN FRANCISCO" => Some("SF"),
        "SEATTLE MARINERS" | "SEATTLE" => Some("SEA"),
        "ST LOUIS CARDINALS" | "ST. LOUIS CARDINALS" | "ST LOUIS" | "ST. LOUIS" => Some("STL"),
        "TAMPA BAY RAYS" | "TAMPA BAY" => Some("TB"),
        "TEXAS RANGERS" | "TEXAS" => Some("TEX"),
        "TORONTO BLUE JAYS" | "TORONTO" => Some("TOR"),
        "WASHINGTON NATIONALS" | "WASHINGTON" => Some("WAS"),
        _ => None,
    }
}

/// Normalize a team name to its canonical code. Unknown spellings fall back
/// to an uppercased, whitespace-collapsed form so already-abbreviated input
/// ("NYM") passes through unchanged.
pub fn normalize_team(name: &str) -> String {
    if let Some(code) = team_code(name) {
        return code.to_string();
    }
    name.to_uppercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fold the accented characters that show up in player names across sources
/// ("José" vs "Jose").
fn fold_accents(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ä' | 'Á' | 'À' => 'a',
            'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' => 'e',
            'í' | 'ì' | 'î' | 'ï' | 'Í' => 'i',
            'ó' | 'ò' | 'ô' | 'ö' | 'Ó' => 'o',
            'ú' | 'ù' | 'û' | 'ü' | 'Ú' => 'u',
            'ñ' | 'Ñ' => 'n',
            other => other,
        })
        .collect()
}

/// Normalize a player name for exact-match joining: fold accents, strip
/// generational suffixes, drop periods, uppercase, collapse whitespace.
pub fn normalize_player(name: &str) -> String {
    let folded = fold_accents(name).to_uppercase().replace('.', "");
    let mut parts: Vec<&str> = folded.split_whitespace().collect();
    while let Some(last) = parts.last() {
        match *last {
            "JR" | "SR" | "II" | "III" | "IV" => {
                parts.pop();
            }
            _ => break,
        }
    }
    parts.join(" ")
}

/// Convert an RFC3339 commence time into its Eastern-time game day, so odds
/// events bucket to the same date as the schedule.
pub fn eastern_game_date(commence_time: &str) -> Option<NaiveDate> {
    let eastern = chrono::FixedOffset::west_opt(5 * 3600)?;
    chrono::DateTime::parse_from_rfc3339(commence_time)
        .ok()
        .map(|dt| dt.with_timezone(&eastern).date_naive())
}
