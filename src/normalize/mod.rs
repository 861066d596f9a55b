mod lexicon;
mod unicode_table;

pub use lexicon::{ConditionFilter, ConditionTable, Lexicon, MeasurementTable, SynonymTable};

use crate::types::CanonicalName;

/// Optional pre-normalization hook a host may register to run before the
/// fixed substitution table, e.g. an LLM-based cleanup pass. Absent by
/// default, in which case `normalize` behaves exactly as if it were
/// never called.
pub type PreNormalizeHook = dyn Fn(&str) -> std::borrow::Cow<'_, str> + Send + Sync;

/// Canonicalizes a raw ingredient string. Pure and deterministic.
/// Returns `None` when the input reduces to a measurement/connector
/// residue or to nothing at all -- per spec this is a normal outcome,
/// not an error.
pub fn normalize(raw: &str) -> Option<CanonicalName> {
    normalize_with_hook(raw, None)
}

pub fn normalize_with_hook(raw: &str, hook: Option<&PreNormalizeHook>) -> Option<CanonicalName> {
    let pre = match hook {
        Some(h) => h(raw).into_owned(),
        None => raw.to_string(),
    };

    // Step 1: fixed character substitutions.
    let substituted = unicode_table::apply_substitutions(&pre);

    // Step 2: Unicode fold (NFKD, strip combining marks, lowercase).
    let folded = unicode_table::fold_unicode(&substituted);

    // Step 3: collapse non [a-z0-9] runs to single spaces, trim.
    let collapsed = collapse_non_alphanumeric(&folded);
    let trimmed = collapsed.trim();

    if trimmed.is_empty() {
        return None;
    }

    let measurements = MeasurementTable::global();

    // Step 4: whole-string measurement-token rejection.
    if measurements.is_unit(trimmed) {
        return None;
    }

    // Step 5: token-level rejection -- all tokens are units, connectors,
    // numerics, or unit-suffixed numerics.
    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }
    if tokens
        .iter()
        .all(|t| measurements.is_unit_or_connector(t) || measurements.is_numeric_or_unit_suffixed(t))
    {
        return None;
    }

    let canonical_form = tokens.join(" ");

    // Step 6: synonym resolution.
    let resolved = SynonymTable::global().resolve(&canonical_form).to_string();

    Some(CanonicalName::new_unchecked(resolved))
}

fn collapse_non_alphanumeric(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_space = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out
}
