//! Accept header parsing and quality-weighted media type selection.

/// One `type/subtype;q=x` clause of an Accept header.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRange {
    pub main_type: String,
    pub sub_type: String,
    pub q: f32,
}

impl MediaRange {
    /// 2 for `type/subtype`, 1 for `type/*`, 0 for `*/*`.
    fn specificity(&self) -> u8 {
        match (self.main_type.as_str(), self.sub_type.as_str()) {
            ("*", _) => 0,
            (_, "*") => 1,
            _ => 2,
        }
    }

    fn matches(&self, main_type: &str, sub_type: &str) -> bool {
        match self.specificity() {
            0 => true,
            1 => self.main_type.eq_ignore_ascii_case(main_type),
            _ => {
                self.main_type.eq_ignore_ascii_case(main_type)
                    && self.sub_type.eq_ignore_ascii_case(sub_type)
            }
        }
    }
}

/// Parses `header` into its media ranges. Clauses without a `/` are
/// dropped and a missing or unparsable `q` counts as 1.
pub fn parse_accept(header: &str) -> Vec<MediaRange> {
    let mut ranges = Vec::new();
    for clause in header.split(',') {
        let mut params = clause.split(';');
        let media = params.next().unwrap_or("").trim();
        let (main_type, sub_type) = match media.split_once('/') {
            Some((m, s)) if !m.trim().is_empty() && !s.trim().is_empty() => (m.trim(), s.trim()),
            _ => continue,
        };
        let mut q = 1.0;
        for param in params {
            if let Some((key, value)) = param.split_once('=') {
                if key.trim().eq_ignore_ascii_case("q") {
                    q = value.trim().parse::<f32>().unwrap_or(1.0).clamp(0.0, 1.0);
                }
            }
        }
        ranges.push(MediaRange {
            main_type: main_type.to_string(),
            sub_type: sub_type.to_string(),
            q,
        });
    }
    ranges
}

/// Quality `header` assigns to `offer`: the q of the most specific range
/// matching it, the highest one among equally specific ranges.
fn quality(ranges: &[MediaRange], offer: &str) -> f32 {
    let media = offer.split(';').next().unwrap_or("").trim();
    let (main_type, sub_type) = match media.split_once('/') {
        Some(parts) => parts,
        None => return 0.0,
    };
    let mut best: Option<(u8, f32)> = None;
    for range in ranges.iter().filter(|r| r.matches(main_type, sub_type)) {
        let candidate = (range.specificity(), range.q);
        best = match best {
            Some((spec, q)) if spec > candidate.0 || (spec == candidate.0 && q >= candidate.1) => {
                Some((spec, q))
            }
            _ => Some(candidate),
        };
    }
    best.map_or(0.0, |(_, q)| q)
}

/// Picks the offer `header` accepts with the highest quality. Ties go to
/// the offer listed first; an offer with quality 0 is never picked.
pub fn negotiate<'o, S: AsRef<str>>(header: &str, offers: &'o [S]) -> Option<&'o str> {
    let ranges = parse_accept(header);
    let mut winner: Option<(&'o str, f32)> = None;
    for offer in offers {
        let q = quality(&ranges, offer.as_ref());
        if q <= 0.0 {
            continue;
        }
        match winner {
            Some((_, best)) if best >= q => {}
            _ => winner = Some((offer.as_ref(), q)),
        }
    }
    winner.map(|(offer, _)| offer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::DEFAULT_ACCEPT;

    #[test]
    fn test_parse_accept() {
        let ranges = parse_accept("text/html, application/xml;q=0.9, bogus, */*;q=0.8");
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[1].sub_type, "xml");
        assert!((ranges[1].q - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn test_exact_match() {
        let offers = ["text/plain", "application/json"];
        assert_eq!(negotiate("application/json", &offers), Some("application/json"));
    }

    #[test]
    fn test_nothing_acceptable() {
        let offers = ["text/plain", "application/xml"];
        assert_eq!(negotiate("application/json", &offers), None);
    }

    #[test]
    fn test_quality_ordering() {
        let offers = ["text/plain", "application/json"];
        assert_eq!(
            negotiate("text/plain;q=0.5, application/json", &offers),
            Some("application/json")
        );
    }

    #[test]
    fn test_ties_go_to_first_offer() {
        let offers = ["application/json", "text/plain"];
        assert_eq!(negotiate("*/*", &offers), Some("application/json"));
    }

    #[test]
    fn test_specific_range_overrides_wildcard() {
        let offers = ["text/html", "text/plain"];
        assert_eq!(negotiate("text/*, text/html;q=0", &offers), Some("text/plain"));
    }

    #[test]
    fn test_default_accept_prefers_html() {
        let offers = ["text/plain", "application/xml", "text/html"];
        assert_eq!(negotiate(DEFAULT_ACCEPT, &offers), Some("text/html"));
        let offers = ["text/plain", "application/xml"];
        assert_eq!(negotiate(DEFAULT_ACCEPT, &offers), Some("application/xml"));
    }
}
