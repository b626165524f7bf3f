// Semantic resolution of user search terms.
//
// Expense categories in the CEAP data are long bureaucratic strings
// ("LOCAÇÃO OU FRETAMENTO DE VEÍCULOS AUTOMOTORES"); users ask for "aluguel
// de carro". The resolver maps free-text terms to keyword sets that are
// OR'd into substring predicates. Pure and deterministic, no I/O.

/// Uppercase and strip Portuguese diacritics.
pub fn normalize(term: &str) -> String {
    term.trim()
        .to_uppercase()
        .chars()
        .map(|c| match c {
            'Á' | 'À' | 'Ã' | 'Â' => 'A',
            'É' | 'Ê' => 'E',
            'Í' | 'Î' => 'I',
            'Ó' | 'Ô' | 'Õ' => 'O',
            'Ú' | 'Û' => 'U',
            'Ç' => 'C',
            _ => c,
        })
        .collect()
}

const VEHICLE_KEYWORDS: &[&str] = &["LOCACAO", "FRETAMENTO", "VEICULO", "AUTOMOTOR"];
const FUEL_KEYWORDS: &[&str] = &["COMBUST", "LUBRIFICANTE"];
const FOOD_KEYWORDS: &[&str] = &["ALIMENTA", "REFEICAO", "REFEIÇÃO"];
const PHONE_KEYWORDS: &[&str] = &["TELEFONE", "TELEFON", "CELULAR"];
const LODGING_KEYWORDS: &[&str] = &["HOTEL", "HOSPEDA", "HOSPEDAGEM"];
const AIRFARE_KEYWORDS: &[&str] = &["PASSAGEM", "AEREA", "AEREO", "AVIAO"];
const PUBLICITY_KEYWORDS: &[&str] = &["DIVULGACAO", "PARLAMENTAR", "ATIVIDADE"];

/// Curated synonym table, keyed by normalized (diacritic-free) user terms.
const SYNONYM_TABLE: &[(&str, &[&str])] = &[
    ("COMBUSTIVEL", FUEL_KEYWORDS),
    ("ALUGUEL DE CARRO", VEHICLE_KEYWORDS),
    ("ALUGUEL DE CARROS", VEHICLE_KEYWORDS),
    ("LOCACAO DE CARRO", VEHICLE_KEYWORDS),
    ("LOCACAO DE CARROS", VEHICLE_KEYWORDS),
    ("FRETAMENTO", VEHICLE_KEYWORDS),
    ("ALIMENTACAO", FOOD_KEYWORDS),
    ("TELEFONIA", PHONE_KEYWORDS),
    ("TELEFONE", PHONE_KEYWORDS),
    ("HOSPEDAGEM", LODGING_KEYWORDS),
    ("HOTEL", LODGING_KEYWORDS),
    ("PASSAGEM AEREA", AIRFARE_KEYWORDS),
    ("PASSAGENS AEREAS", AIRFARE_KEYWORDS),
    ("PASSAGENS AEREA", AIRFARE_KEYWORDS),
    ("PASSAGEM", AIRFARE_KEYWORDS),
    ("PASSAGENS", AIRFARE_KEYWORDS),
    ("DIVULGACAO", PUBLICITY_KEYWORDS),
    ("DIVULGACAO PARLAMENTAR", PUBLICITY_KEYWORDS),
];

/// Ordered heuristic rules applied when the synonym table has no hit: any
/// occurrence of a pattern word maps to the corresponding keyword set.
const HEURISTICS: &[(&[&str], &[&str])] = &[
    (&["CARRO", "AUTOMOVEL", "VEICULO"], VEHICLE_KEYWORDS),
    (&["COMBUST", "GASOLINA", "ETANOL", "DIESEL"], FUEL_KEYWORDS),
    (&["TELEFONE", "CELULAR", "TELEFONIA"], PHONE_KEYWORDS),
    (&["HOTEL", "HOSPEDA", "HOSPEDAGEM"], LODGING_KEYWORDS),
    (&["ALIMENTA", "COMIDA", "REFEICAO"], FOOD_KEYWORDS),
    (&["PASSAGEM", "AEREA", "AVIAO"], AIRFARE_KEYWORDS),
];

fn to_owned_set(keywords: &[&str]) -> Vec<String> {
    keywords.iter().map(|k| k.to_string()).collect()
}

/// Map a free-text expense term to a non-empty set of keyword fragments,
/// to be matched case-insensitively against the stored `expense_type`.
///
/// Resolution order: exact synonym hit, substring overlap with a table key,
/// shared whitespace token with a table key, heuristic keyword rules,
/// literal fallback (the term itself, with and without diacritics) so an
/// unknown term degrades to a plain substring search instead of failing.
pub fn resolve_expense_terms(user_term: &str) -> Vec<String> {
    let trimmed_upper = user_term.trim().to_uppercase();
    let deaccented = normalize(user_term);

    // Exact lookup
    for (key, keywords) in SYNONYM_TABLE {
        if *key == deaccented {
            return to_owned_set(keywords);
        }
    }

    // Fuzzy: substring overlap between the normalized input and a key
    for (key, keywords) in SYNONYM_TABLE {
        if deaccented.contains(key) || key.contains(deaccented.as_str()) {
            return to_owned_set(keywords);
        }
    }

    // Fuzzy: any shared whitespace-delimited token
    let user_words: Vec<&str> = deaccented.split_whitespace().collect();
    for (key, keywords) in SYNONYM_TABLE {
        let key_words: Vec<&str> = key.split_whitespace().collect();
        if key_words.iter().any(|kw| user_words.contains(kw))
            || user_words.iter().any(|uw| key_words.contains(uw))
        {
            return to_owned_set(keywords);
        }
    }

    // Heuristic keyword rules, in order
    for (patterns, keywords) in HEURISTICS {
        if patterns.iter().any(|p| deaccented.contains(p)) {
            return to_owned_set(keywords);
        }
    }

    // Literal fallback: degrade to a substring match on the term itself
    if trimmed_upper == deaccented {
        vec![deaccented]
    } else {
        vec![trimmed_upper, deaccented]
    }
}

/// Deprecated party acronyms mapped to their current successors.
const PARTY_SUCCESSORS: &[(&str, &str)] = &[
    ("PFL", "UNIÃO"),
    ("DEM", "UNIÃO"),
    ("PSL", "UNIÃO"),
    ("PR", "PL"),
    ("PRB", "REPUBLICANOS"),
    ("PPS", "CIDADANIA"),
    ("PTN", "PODE"),
    ("PMDB", "MDB"),
    ("PEN", "PATRIOTA"),
    ("PPL", "PCdoB"),
];

/// Map a party acronym to its current form. Total: unknown acronyms come
/// back uppercased as-is.
pub fn resolve_party(acronym: &str) -> String {
    let upper = acronym.trim().to_uppercase();
    for (old, current) in PARTY_SUCCESSORS {
        if *old == upper {
            return current.to_string();
        }
    }
    upper
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_diacritics() {
        assert_eq!(normalize("locação de veículos"), "LOCACAO DE VEICULOS");
        assert_eq!(normalize("  Combustível "), "COMBUSTIVEL");
        assert_eq!(normalize("PASSAGENS AÉREAS"), "PASSAGENS AEREAS");
    }

    #[test]
    fn test_diacritic_and_case_variants_resolve_identically() {
        let variants = ["Combustível", "COMBUSTIVEL", "combustível", "COMBUSTÍVEL"];
        let expected = resolve_expense_terms("combustivel");
        for v in variants {
            assert_eq!(resolve_expense_terms(v), expected, "variant: {}", v);
        }
    }

    #[test]
    fn test_car_rental_expands_to_vehicle_keywords() {
        // "aluguel de carro" must reach "LOCAÇÃO OU FRETAMENTO DE VEÍCULOS
        // AUTOMOTORES" via the keyword set
        let keywords = resolve_expense_terms("aluguel de carro");
        assert!(keywords.contains(&"FRETAMENTO".to_string()));
        assert!(keywords.contains(&"AUTOMOTOR".to_string()));

        let stored = "LOCAÇÃO OU FRETAMENTO DE VEÍCULOS AUTOMOTORES";
        assert!(keywords.iter().any(|kw| stored.contains(kw.as_str())));
    }

    #[test]
    fn test_token_overlap_matches() {
        // Shares the token "CARRO" with the "ALUGUEL DE CARRO" key
        let keywords = resolve_expense_terms("carro alugado");
        assert_eq!(keywords, to_owned_set(VEHICLE_KEYWORDS));
    }

    #[test]
    fn test_heuristic_fuel() {
        let keywords = resolve_expense_terms("gastos com gasolina");
        assert_eq!(keywords, to_owned_set(FUEL_KEYWORDS));
    }

    #[test]
    fn test_fallback_is_literal_and_never_empty() {
        let keywords = resolve_expense_terms("consultoria jurídica");
        assert!(!keywords.is_empty());
        assert!(keywords.contains(&"CONSULTORIA JURIDICA".to_string()));
        // Accented variant kept so a literal match against accented
        // categories still works
        assert!(keywords.contains(&"CONSULTORIA JURÍDICA".to_string()));
    }

    #[test]
    fn test_fallback_deduplicates_ascii_terms() {
        let keywords = resolve_expense_terms("seguranca");
        assert_eq!(keywords, vec!["SEGURANCA".to_string()]);
    }

    #[test]
    fn test_party_successor_mapping() {
        assert_eq!(resolve_party("PMDB"), "MDB");
        assert_eq!(resolve_party("dem"), "UNIÃO");
        assert_eq!(resolve_party("PT"), "PT");
        assert_eq!(resolve_party(" pl "), "PL");
    }
}
