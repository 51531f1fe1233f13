//! Gas column naming.

/// Raw CRT column names and the canonical names they are stored under.
pub const GAS_STANDARD_NAMES: &[(&str, &str)] = &[
    ("CO2 (1) CO2 equivalents (kt ) (2)", "CO₂ (kt)"),
    ("CO2", "CO₂ (kt)"),
    ("CH4", "CH₄ (kt)"),
    ("N2O", "N₂O (kt)"),
    ("HFCs", "HFCs (kt)"),
    ("PFCs", "PFCs (kt)"),
    ("Unspecified mix of HFCs and PFCs", "HFC+PFC Mix (kt)"),
    ("SF6", "SF₆ (kt)"),
    ("NF3", "NF₃ (kt)"),
];

pub const FIRST_INVENTORY_YEAR: i32 = 1990;
pub const LATEST_INVENTORY_YEAR: i32 = 2023;

/// Fragments of value columns worth keeping besides the per-year columns.
const VALUE_KEYWORDS: &[&str] = &[
    "CO₂",
    "CH₄",
    "N₂O",
    "SF₆",
    "HFC",
    "PFC",
    "NF₃",
    "Base year (1)",
    "Change from base to latest",
];

const NON_CO2_MARKERS: &[&str] = &["CH₄", "N₂O", "SF₆", "HFCs", "PFCs"];

/// Maps a known raw gas header onto its canonical name.
///
/// A header that picked up a `(kt)` unit from an absorbed unit row maps the
/// same way as the bare gas name.
pub fn standardize_column(name: &str) -> String {
    let trimmed = name.trim();
    let bare = trimmed
        .strip_suffix("(kt)")
        .map_or(trimmed, str::trim_end);
    GAS_STANDARD_NAMES
        .iter()
        .find(|(raw, _)| *raw == trimmed || *raw == bare)
        .map_or_else(|| name.to_owned(), |(_, canonical)| (*canonical).to_owned())
}

/// Distinct canonical gas names, in declaration order.
pub fn canonical_gases() -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();
    for (_, canonical) in GAS_STANDARD_NAMES {
        if !out.contains(canonical) {
            out.push(*canonical);
        }
    }
    out
}

/// Whether a value column survives the gas/year keyword filter.
pub fn is_retained_value_column(name: &str) -> bool {
    VALUE_KEYWORDS.iter().any(|k| name.contains(k))
        || (FIRST_INVENTORY_YEAR..=LATEST_INVENTORY_YEAR).any(|y| name.contains(&y.to_string()))
}

/// ASCII slug for a gas column, used in directory and file names.
///
/// Takes the first word of the name and folds subscripts: `"CO₂ (kt)"` becomes
/// `co2`, `"HFC+PFC Mix (kt)"` becomes `hfc_pfc`.
pub fn gas_slug(name: &str) -> String {
    let first = name.split_whitespace().next().unwrap_or(name);
    first
        .chars()
        .map(|c| match c {
            '₀'..='₉' => char::from_digit(c as u32 - '₀' as u32, 10).unwrap_or('_'),
            c if c.is_ascii_alphanumeric() => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}

pub fn is_co2_column(name: &str) -> bool {
    name.contains("CO₂")
}

pub fn is_other_gas_column(name: &str) -> bool {
    NON_CO2_MARKERS.iter().any(|g| name.contains(g))
}
