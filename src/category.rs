/// Label prefixes that put a row on the memo side channel.
const MEMO_PREFIXES: &[&str] = &["Memo items:", "1.D.", "5.F.", "Indirect N2O", "Indirect CO2"];

/// Segment appended to the inherited path of an un-numbered continuation row.
pub const CHILD_SEGMENT: &str = "child";

/// One category label split into its outline path and display text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryNode {
    /// Outline segments, e.g. `["1", "A", "2", "a"]` for `1.A.2.a`.
    pub path: Vec<String>,
    pub label: String,
    pub is_memo: bool,
    pub is_numbered: bool,
}

impl CategoryNode {
    pub fn is_total(&self) -> bool {
        self.label.starts_with("Total")
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

/// Parses one category label such as `"1.A.2.a Manufacturing Industries"`.
///
/// A label is numbered when it starts with a digit and either contains a `.`
/// or opens with a purely numeric code token (`"1 Energy"`). Numbered labels
/// are split at the first space into code and text; without a space the whole
/// string serves as both. Totals short-circuit: they never carry a path and are
/// never memo items.
pub fn parse_category(raw: &str) -> CategoryNode {
    let raw = raw.trim();

    if raw.starts_with("Total") {
        return CategoryNode {
            label: raw.to_owned(),
            ..CategoryNode::default()
        };
    }

    let is_memo = MEMO_PREFIXES.iter().any(|p| raw.starts_with(p));

    if !is_numbered(raw) {
        return CategoryNode {
            path: Vec::new(),
            label: raw.to_owned(),
            is_memo,
            is_numbered: false,
        };
    }

    let (code, label) = raw.split_once(' ').unwrap_or((raw, raw));
    let path = code
        .trim_matches('.')
        .split('.')
        .filter(|segment| !segment.is_empty())
        .map(str::to_owned)
        .collect();

    CategoryNode {
        path,
        label: label.trim().to_owned(),
        is_memo,
        is_numbered: true,
    }
}

fn is_numbered(raw: &str) -> bool {
    if !raw.starts_with(|c: char| c.is_ascii_digit()) {
        return false;
    }
    if raw.contains('.') {
        return true;
    }
    raw.split_once(' ')
        .is_some_and(|(code, _)| code.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn dotted_code_becomes_path() {
        let node = parse_category("1.A.2.a Manufacturing Industries");
        assert_eq!(
            node,
            CategoryNode {
                path: path(&["1", "A", "2", "a"]),
                label: "Manufacturing Industries".into(),
                is_memo: false,
                is_numbered: true,
            }
        );
    }

    #[test]
    fn path_length_matches_code_depth() {
        let codes = ["7", "1.A", "2.B.3", "3.A.1.a", "4.C.2.b.i", "1.A.1.a.i.1", "5.B.2.a.i.1.x"];
        for code in codes {
            let depth = code.split('.').count();
            let node = parse_category(&format!("{code} some label"));
            assert_eq!(node.depth(), depth, "{code}");
            assert_eq!(node.label, "some label");
            assert!(node.is_numbered);
        }
    }

    #[test]
    fn trailing_dot_is_stripped() {
        let node = parse_category("1. Energy");
        assert_eq!(node.path, path(&["1"]));
        assert_eq!(node.label, "Energy");
    }

    #[test]
    fn code_without_space_is_its_own_label() {
        let node = parse_category("2.B.10");
        assert_eq!(node.path, path(&["2", "B", "10"]));
        assert_eq!(node.label, "2.B.10");
        assert!(node.is_numbered);
    }

    #[test]
    fn totals_never_carry_a_path() {
        for raw in ["Total national emissions", "Total (net emissions) (1)", "Total 1.D. bunkers"] {
            let node = parse_category(raw);
            assert!(node.path.is_empty());
            assert!(!node.is_numbered);
            assert!(!node.is_memo);
            assert!(node.is_total());
        }
    }

    #[test]
    fn memo_prefixes_are_flagged() {
        assert!(parse_category("Memo items: (3)").is_memo);
        assert!(parse_category("Indirect CO2").is_memo);
        assert!(parse_category("Indirect N2O").is_memo);

        let bunkers = parse_category("1.D.1 International bunkers");
        assert!(bunkers.is_memo);
        assert!(bunkers.is_numbered);
        assert_eq!(bunkers.path, path(&["1", "D", "1"]));

        assert!(!parse_category("1.A Fuel combustion").is_memo);
    }

    #[test]
    fn prose_is_kept_verbatim() {
        let node = parse_category("  Land use, land-use change and forestry  ");
        assert_eq!(node.label, "Land use, land-use change and forestry");
        assert!(node.path.is_empty());
        assert!(!node.is_numbered);

        // A bare numeric token reads as a code; any other leading digit is prose.
        let node = parse_category("2006 IPCC guidelines");
        assert!(node.is_numbered);
        assert_eq!(node.path, path(&["2006"]));
        let node = parse_category("3rd party estimates");
        assert!(!node.is_numbered);
    }
}
