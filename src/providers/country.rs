//! ISO-3166 alpha-2 to English country name.
//!
//! The native provider's `location` parameter wants human-readable country
//! names. This table covers the markets the engine is typically pointed at;
//! unknown codes pass through as the alpha-2 code.

static COUNTRY_NAMES: &[(&str, &str)] = &[
    ("AE", "United Arab Emirates"),
    ("AR", "Argentina"),
    ("AT", "Austria"),
    ("AU", "Australia"),
    ("BE", "Belgium"),
    ("BG", "Bulgaria"),
    ("BR", "Brazil"),
    ("CA", "Canada"),
    ("CH", "Switzerland"),
    ("CL", "Chile"),
    ("CN", "China"),
    ("CO", "Colombia"),
    ("CZ", "Czechia"),
    ("DE", "Germany"),
    ("DK", "Denmark"),
    ("EG", "Egypt"),
    ("ES", "Spain"),
    ("FI", "Finland"),
    ("FR", "France"),
    ("GB", "United Kingdom"),
    ("GR", "Greece"),
    ("HK", "Hong Kong"),
    ("HU", "Hungary"),
    ("ID", "Indonesia"),
    ("IE", "Ireland"),
    ("IL", "Israel"),
    ("IN", "India"),
    ("IT", "Italy"),
    ("JP", "Japan"),
    ("KR", "South Korea"),
    ("MX", "Mexico"),
    ("MY", "Malaysia"),
    ("NG", "Nigeria"),
    ("NL", "Netherlands"),
    ("NO", "Norway"),
    ("NZ", "New Zealand"),
    ("PE", "Peru"),
    ("PH", "Philippines"),
    ("PK", "Pakistan"),
    ("PL", "Poland"),
    ("PT", "Portugal"),
    ("RO", "Romania"),
    ("SA", "Saudi Arabia"),
    ("SE", "Sweden"),
    ("SG", "Singapore"),
    ("TH", "Thailand"),
    ("TR", "Turkey"),
    ("TW", "Taiwan"),
    ("UA", "Ukraine"),
    ("US", "United States"),
    ("VN", "Vietnam"),
    ("ZA", "South Africa"),
];

/// English name for an alpha-2 country code; the code itself when unknown.
pub fn country_name(code: &str) -> &str {
    let upper = code.trim();
    COUNTRY_NAMES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(upper))
        .map(|(_, name)| *name)
        .unwrap_or(upper)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(country_name("US"), "United States");
        assert_eq!(country_name("de"), "Germany");
        assert_eq!(country_name("GB"), "United Kingdom");
    }

    #[test]
    fn test_unknown_code_passes_through() {
        assert_eq!(country_name("XX"), "XX");
        assert_eq!(country_name(""), "");
    }

    #[test]
    fn test_table_is_sorted_and_unique() {
        let mut prev = "";
        for (code, _) in COUNTRY_NAMES {
            assert!(*code > prev, "table must stay sorted: {code}");
            prev = code;
        }
    }
}
