/// Text signal extraction for lead scoring.
///
/// Keyword sets are maintained per concern. Each list mixes German, English,
/// Turkish and Polish variants so a single scan covers the languages the
/// chat widget ships with; there is no language detection. Matching is
/// case-insensitive substring containment, not word-boundary matching —
/// "modell" matches "model" on purpose, because the intake texts are short
/// and the original tuning assumes it.
///
/// All functions here are pure and expect an already-lowercased input
/// (callers lowercase once per text).
use regex::Regex;

/// Distress language: the customer needs help now.
pub const URGENCY_KEYWORDS: &[&str] = &[
    "sofort", "dringend", "notfall", "hilfe", "kaputt", "defekt", "urgent", "emergency", "asap",
    "help", "broken", "acil", "yardım", "bozuk", "pilne", "awaria", "pomoc", "zepsuty",
];

/// Deadline language: the customer names a time frame.
pub const TIME_PRESSURE_KEYWORDS: &[&str] = &[
    "heute", "morgen", "schnell", "today", "tomorrow", "quick", "fast", "bugün", "yarın", "hemen",
    "dzisiaj", "jutro", "szybko",
];

/// Transactional language: the customer wants to buy or book.
pub const PURCHASE_INTENT_KEYWORDS: &[&str] = &[
    "kaufen", "buchen", "termin", "buy", "book", "appointment", "satın", "randevu", "kupić",
    "wizyta",
];

/// The customer asks for a concrete workshop service.
pub const SERVICE_INTENT_KEYWORDS: &[&str] = &[
    "reparatur", "wartung", "inspektion", "repair", "maintenance", "inspection", "tamir", "bakım",
    "naprawa", "przegląd",
];

/// Services with above-average job value.
pub const HIGH_VALUE_KEYWORDS: &[&str] = &[
    "tüv", "hauptuntersuchung", "bremsen", "motor", "brakes", "engine", "muayene", "fren",
    "hamulce", "silnik",
];

/// Politeness markers.
pub const POLITENESS_KEYWORDS: &[&str] = &[
    "bitte", "danke", "please", "thank", "lütfen", "teşekkür", "proszę", "dziękuję",
];

/// Technical vocabulary of an informed customer.
pub const TECHNICAL_KEYWORDS: &[&str] = &[
    "motor", "getriebe", "bremse", "kupplung", "turbo", "engine", "gearbox", "transmission",
    "brake", "clutch", "şanzıman", "debriyaj", "silnik", "skrzynia", "hamulec", "sprzęgło",
];

/// Interrogatives used to spot substantive questions.
pub const QUESTION_WORDS: &[&str] = &[
    "was", "wie", "wann", "warum", "welche", "what", "how", "when", "why", "which", "nasıl",
    "neden", "kiedy", "jak", "dlaczego",
];

/// Cost and price vocabulary. "kost" is a stem: it covers "kosten",
/// "kostet" and "kostenvoranschlag" alike.
pub const COST_KEYWORDS: &[&str] = &[
    "kost", "preis", "teuer", "cost", "price", "expensive", "fiyat", "ücret", "cena", "koszt",
];

/// Returns the distinct keywords from `keywords` contained in `text`.
pub fn matching_keywords<'a>(text: &str, keywords: &[&'a str]) -> Vec<&'a str> {
    keywords
        .iter()
        .filter(|kw| text.contains(*kw))
        .copied()
        .collect()
}

/// True if any keyword from the set is contained in `text`.
pub fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| text.contains(kw))
}

/// Total number of (non-overlapping) keyword occurrences in `text`,
/// summed over the whole set. "termin heute, termin morgen" counts the
/// purchase-intent word twice.
pub fn count_occurrences(text: &str, keywords: &[&str]) -> usize {
    keywords.iter().map(|kw| text.matches(kw).count()).sum()
}

/// True if `text` reads like a substantive question: it carries a question
/// mark, an interrogative, or cost vocabulary.
pub fn is_complex_message(text: &str) -> bool {
    text.contains('?') || contains_any(text, QUESTION_WORDS) || contains_any(text, COST_KEYWORDS)
}

/// True if `text` mentions vehicle specifics: a four-digit model year,
/// mileage, or a model/construction-year reference.
pub fn mentions_vehicle_details(text: &str) -> bool {
    if text.contains("km") || text.contains("baujahr") || text.contains("model") {
        return true;
    }
    let year_re = Regex::new(r"(19|20)\d{2}").unwrap();
    year_re.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_keywords_distinct() {
        let text = "bremsen kaputt, sofort hilfe, nochmal: sofort!";
        let found = matching_keywords(text, URGENCY_KEYWORDS);
        // "sofort" appears twice but is reported once
        assert_eq!(found.iter().filter(|k| **k == "sofort").count(), 1);
        assert!(found.contains(&"hilfe"));
        assert!(found.contains(&"kaputt"));
    }

    #[test]
    fn test_substring_matching_is_intentionally_naive() {
        // "model" matches inside the German "modell"
        assert!(mentions_vehicle_details("golf 7 modellpflege"));
        // "termin" matches inside "terminvereinbarung"
        assert!(contains_any(
            "terminvereinbarung gewünscht",
            PURCHASE_INTENT_KEYWORDS
        ));
    }

    #[test]
    fn test_count_occurrences_counts_repeats() {
        let text = "termin heute oder termin morgen, gerne auch buchen";
        assert_eq!(count_occurrences(text, PURCHASE_INTENT_KEYWORDS), 3);
    }

    #[test]
    fn test_multilingual_lists_cover_all_four_languages() {
        assert!(contains_any("acil yardım lazım", URGENCY_KEYWORDS));
        assert!(contains_any("awaria silnika, pilne", URGENCY_KEYWORDS));
        assert!(contains_any("my car is broken", URGENCY_KEYWORDS));
        assert!(contains_any("auto ist kaputt", URGENCY_KEYWORDS));
    }

    #[test]
    fn test_complex_message_detection() {
        assert!(is_complex_message("was kostet das?"));
        assert!(is_complex_message("wie lange dauert die reparatur"));
        assert!(is_complex_message("preis für bremsen"));
        assert!(!is_complex_message("ok danke tschüss"));
    }

    #[test]
    fn test_vehicle_detail_detection() {
        assert!(mentions_vehicle_details("bmw 320d baujahr 2018"));
        assert!(mentions_vehicle_details("der wagen hat 120000 km"));
        assert!(mentions_vehicle_details("ez 2015"));
        assert!(!mentions_vehicle_details("mein auto macht geräusche"));
    }

    #[test]
    fn test_empty_text_matches_nothing() {
        assert!(matching_keywords("", URGENCY_KEYWORDS).is_empty());
        assert!(!contains_any("", COST_KEYWORDS));
        assert_eq!(count_occurrences("", PURCHASE_INTENT_KEYWORDS), 0);
    }
}
