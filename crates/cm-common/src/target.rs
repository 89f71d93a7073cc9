use serde::Serialize;

/// The active build target. Decides target filtering (`#[target(...)]`)
/// and which backend the driver hands the MIR to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Target {
    Native,
    Wasm,
    Js,
    Web,
    Interpreter,
}

impl Target {
    /// Parse a `--target=` value. Unknown strings fall back to `Native`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "wasm" => Target::Wasm,
            "js" => Target::Js,
            "web" => Target::Web,
            "intr" => Target::Interpreter,
            _ => Target::Native,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Target::Native => "native",
            Target::Wasm => "wasm",
            Target::Js => "js",
            Target::Web => "web",
            Target::Interpreter => "intr",
        }
    }

    /// Whether a `#[target(...)]` atom matches this target.
    ///
    /// The `js` atom matches both `Js` and `Web`; `active` always matches.
    /// A leading `!` negates the atom.
    pub fn matches_atom(self, atom: &str) -> bool {
        let (negated, name) = match atom.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, atom),
        };
        let hit = match name {
            "active" => true,
            "js" => matches!(self, Target::Js | Target::Web),
            "web" => self == Target::Web,
            "wasm" => self == Target::Wasm,
            "native" => self == Target::Native,
            "intr" => self == Target::Interpreter,
            _ => false,
        };
        hit != negated
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trip() {
        for t in [Target::Native, Target::Wasm, Target::Js, Target::Web, Target::Interpreter] {
            assert_eq!(Target::from_str_lossy(t.as_str()), t);
        }
        assert_eq!(Target::from_str_lossy("unknown"), Target::Native);
    }

    #[test]
    fn js_atom_matches_web() {
        assert!(Target::Js.matches_atom("js"));
        assert!(Target::Web.matches_atom("js"));
        assert!(!Target::Native.matches_atom("js"));
    }

    #[test]
    fn negation_flips_the_match() {
        assert!(Target::Native.matches_atom("!js"));
        assert!(!Target::Js.matches_atom("!js"));
    }

    #[test]
    fn active_always_matches() {
        for t in [Target::Native, Target::Wasm, Target::Js, Target::Web, Target::Interpreter] {
            assert!(t.matches_atom("active"));
            assert!(!t.matches_atom("!active"));
        }
    }
}
