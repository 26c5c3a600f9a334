use rand::Rng;

/// Audience-estimate ranges per channel, matched by substring against the
/// normalized program name. Declaration order matters: the first matching
/// entry wins.
pub const RANGES: [(&str, u32, u32); 7] = [
    ("panorama", 8434, 11345),
    ("luna tv", 8434, 11345),
    ("cinevision", 8434, 11345),
    ("teleantillas", 23943, 45000),
    ("rnn", 23943, 45000),
    ("teleuniverso", 23943, 45000),
    ("color vision", 60000, 80000),
];

pub const DEFAULT_RANGE: (u32, u32) = (23543, 30000);

/// Decorative impact rating for a program name. Not a measurement: a fresh
/// uniform draw from the matching range on every call. Callers that need a
/// stable number memoize the result (the feed does, per item).
pub fn rating_for_program(program_name: &str) -> u32 {
    let (min, max) = range_for_program(program_name);
    rand::thread_rng().gen_range(min..=max)
}

pub fn range_for_program(program_name: &str) -> (u32, u32) {
    let normalized = program_name.to_lowercase();
    let normalized = normalized.trim();
    if normalized.is_empty() {
        return DEFAULT_RANGE;
    }
    for (key, min, max) in RANGES {
        if normalized.contains(key) {
            return (min, max);
        }
    }
    DEFAULT_RANGE
}

/// es-ES style thousands grouping: 23943 -> "23.943".
pub fn format_rating(rating: u32) -> String {
    let digits = rating.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    let offset = digits.len() % 3;
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (index + 3 - offset) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panorama_maps_to_low_band() {
        assert_eq!(range_for_program("Panorama Edición"), (8434, 11345));
        for _ in 0..50 {
            let rating = rating_for_program("Panorama Edición");
            assert!((8434..=11345).contains(&rating), "rating {rating}");
        }
    }

    #[test]
    fn first_declared_match_wins() {
        // "luna tv rnn" contains two keys; declaration order decides.
        assert_eq!(range_for_program("Luna TV RNN"), (8434, 11345));
    }

    #[test]
    fn unknown_names_use_default() {
        assert_eq!(range_for_program("Canal Desconocido"), DEFAULT_RANGE);
        assert_eq!(range_for_program(""), DEFAULT_RANGE);
        let rating = rating_for_program("Canal Desconocido");
        assert!((DEFAULT_RANGE.0..=DEFAULT_RANGE.1).contains(&rating));
    }

    #[test]
    fn ratings_group_thousands_with_dots() {
        assert_eq!(format_rating(23943), "23.943");
        assert_eq!(format_rating(945), "945");
        assert_eq!(format_rating(1234567), "1.234.567");
    }
}
