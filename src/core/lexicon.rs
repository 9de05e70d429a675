//! Lexical normalizer
//!
//! Maps arbitrary field names onto the headers a source actually carries, so
//! later code can ask for "the balance column" without knowing how a given
//! institution spelled it. Matching works on stems produced by a trimmed
//! Porter-style stemmer, with a banking synonym table as the fallback.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Synonym groups for banking vocabulary. Order matters: the first group
/// containing the field's stem wins.
const SYNONYM_GROUPS: &[&[&str]] = &[
    &[
        "fee", "charge", "cost", "duty", "collection", "levy", "assessment", "imposition",
        "surcharge", "service fee", "commission", "toll", "premium", "tariff",
    ],
    &[
        "open", "term", "origination", "start", "create", "establish", "setup", "initiate",
        "commence", "activate", "launch", "inception", "beginning", "provenance",
    ],
    &[
        "checking", "dda", "demand deposit", "share", "current account", "transaction account",
        "share draft",
    ],
    &["savings", "money market", "thrift", "deposit account", "share savings"],
    &[
        "withdrawal", "check", "draft", "debit", "payout", "disbursement", "deduction", "cash out",
    ],
    &["deposit", "credit", "payment", "fund", "lodge", "add funds", "contribution"],
    &[
        "certificate", "cd", "cod", "certificate of deposit", "time deposit", "term deposit",
        "fixed deposit",
    ],
    &[
        "owner", "responsibility", "officer", "holder", "proprietor", "account holder",
        "signatory",
    ],
    &["type", "classification", "class", "category", "kind", "variety"],
    &["location", "branch", "office", "site", "outlet", "region"],
    &[
        "principal", "balance", "outstanding", "capital", "remaining amount", "unpaid portion",
    ],
    &["balance", "funds on deposit", "available funds", "funds"],
    &["interest", "finance charge", "rate", "accrued interest", "return", "yield"],
    &["loan", "credit facility", "mortgage", "financing", "advance", "lending"],
    &["account", "bank account", "ledger", "record", "customer account"],
    &[
        "statement", "bank statement", "account statement", "summary", "transaction record",
    ],
    &[
        "overdraft", "negative balance", "overdrawn account", "shortfall", "deficit",
    ],
    &[
        "wire transfer", "electronic funds transfer", "EFT", "bank wire", "remittance",
        "telegraphic transfer", "wires",
    ],
];

/// Each synonym group, stemmed once
static STEMMED_GROUPS: Lazy<Vec<Vec<String>>> = Lazy::new(|| {
    SYNONYM_GROUPS
        .iter()
        .map(|group| group.iter().map(|word| stem(word)).collect())
        .collect()
});

/// Lemma overrides checked before any rule applies
static IRREGULARS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("running", "run"),
        ("ran", "run"),
        ("swimming", "swim"),
        ("swam", "swim"),
        ("taking", "take"),
        ("took", "take"),
        ("gone", "go"),
        ("went", "go"),
        ("being", "be"),
        ("was", "be"),
        ("were", "be"),
        ("having", "have"),
        ("had", "have"),
        ("fees", "fee"),
        ("responsibility", "resp"),
    ])
});

const STEP2: &[(&str, &str)] = &[
    ("ational", "ate"),
    ("tional", "tion"),
    ("enci", "ence"),
    ("anci", "ance"),
    ("izer", "ize"),
    ("bli", "ble"),
    ("alli", "al"),
    ("entli", "ent"),
    ("eli", "e"),
    ("ousli", "ous"),
    ("ization", "ize"),
    ("ation", "ate"),
    ("ator", "ate"),
    ("alism", "al"),
    ("iveness", "ive"),
    ("fulness", "ful"),
    ("ousness", "ous"),
    ("aliti", "al"),
    ("iviti", "ive"),
    ("biliti", "ble"),
    ("logi", "log"),
];

const STEP3: &[(&str, &str)] = &[
    ("icate", "ic"),
    ("ative", ""),
    ("alize", "al"),
    ("iciti", "ic"),
    ("ical", "ic"),
    ("ful", ""),
    ("ness", ""),
];

const STEP4: &[&str] = &[
    "al", "ance", "ence", "er", "ic", "able", "ible", "ant", "ement", "ment", "ent", "ou", "ism",
    "ate", "iti", "ous", "ive", "ize",
];

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y')
}

fn has_vowel(s: &str) -> bool {
    s.chars().any(is_vowel)
}

/// Number of vowel-run → consonant-run transitions (`y` counts as a vowel)
fn measure(s: &str) -> usize {
    let mut count = 0;
    let mut prev_vowel = false;
    for c in s.chars() {
        let vowel = is_vowel(c);
        if prev_vowel && !vowel {
            count += 1;
        }
        prev_vowel = vowel;
    }
    count
}

/// Ends consonant (not a,e,i,o,u) + vowel (incl. y) + consonant (not a vowel or y)
fn ends_cvc(s: &str) -> bool {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < 3 {
        return false;
    }
    let n = chars.len();
    let (c1, v, c2) = (chars[n - 3], chars[n - 2], chars[n - 1]);
    !matches!(c1, 'a' | 'e' | 'i' | 'o' | 'u') && is_vowel(v) && !is_vowel(c2)
}

fn ends_double(s: &str) -> bool {
    let mut rev = s.chars().rev();
    matches!((rev.next(), rev.next()), (Some(a), Some(b)) if a == b)
}

fn drop_suffix<'a>(word: &'a str, suffix: &str) -> &'a str {
    &word[..word.len() - suffix.len()]
}

/// Clean-up after removing -ed / -ing
fn fix_up_stripped(mut word: String) -> String {
    if word.ends_with("at") || word.ends_with("bl") || word.ends_with("iz") {
        word.push('e');
    } else if ends_double(&word) {
        word.pop();
    } else if measure(&word) == 1 && ends_cvc(&word) {
        word.push('e');
    }
    word
}

/// Reduce a word to its canonical stem.
///
/// # Example
/// ```
/// use royalbit_ledger::core::lexicon::stem;
///
/// assert_eq!(stem("Balances"), "balanc");
/// assert_eq!(stem("hopping"), "hop");
/// ```
pub fn stem(word: &str) -> String {
    let mut word = word.to_lowercase();

    if let Some(lemma) = IRREGULARS.get(word.as_str()) {
        return (*lemma).to_string();
    }
    if word.chars().count() <= 2 {
        return word;
    }

    // Step 1a: plurals
    if word.ends_with("sses") {
        word.truncate(word.len() - 2);
    } else if word.ends_with("ies") {
        word.truncate(word.len() - 3);
        word.push('i');
    } else if word.ends_with("ss") {
        // unchanged
    } else if word.ends_with('s') {
        if has_vowel(drop_suffix(&word, "s")) {
            word.pop();
        }
    }

    // Step 1b: -ed / -ing
    if word.ends_with("ed") {
        let candidate = drop_suffix(&word, "ed");
        if has_vowel(candidate) {
            word = fix_up_stripped(candidate.to_string());
        }
    } else if word.ends_with("ing") {
        let candidate = drop_suffix(&word, "ing");
        if has_vowel(candidate) {
            word = fix_up_stripped(candidate.to_string());
        }
    }

    // Step 1c: y -> i
    if word.ends_with('y') {
        let candidate = drop_suffix(&word, "y");
        if has_vowel(candidate) {
            word = format!("{candidate}i");
        }
    }

    // Steps 2 and 3: first matching suffix only, replaced when measure(stem) > 0
    for table in [STEP2, STEP3] {
        if let Some((suffix, replacement)) = table.iter().find(|(s, _)| word.ends_with(s)) {
            let candidate = drop_suffix(&word, suffix);
            if measure(candidate) > 0 {
                word = format!("{candidate}{replacement}");
            }
        }
    }

    // Step 4: first matching suffix only, removed when measure(stem) > 1
    if let Some(suffix) = STEP4.iter().find(|s| word.ends_with(*s)) {
        let keep = word.len() - suffix.len();
        if measure(&word[..keep]) > 1 {
            word.truncate(keep);
        }
    }

    // Step 5: trailing e, then ll
    if word.ends_with('e') {
        let keep = word.len() - 1;
        let m = measure(&word[..keep]);
        if m > 1 || (m == 1 && !ends_cvc(&word[..keep])) {
            word.truncate(keep);
        }
    }
    if measure(&word) > 1 && word.ends_with("ll") {
        word.pop();
    }

    word
}

/// Find the header a field name refers to.
///
/// `source.field` notation is reduced to `field`; non-alphanumerics are
/// stripped and the remainder stemmed. The first header containing the stem
/// (case-insensitive) wins. Otherwise, unless `strict`, the synonym groups
/// containing the stem are tried in order and the first header containing
/// any synonym of a group wins. Returns `None` when nothing matches.
pub fn resolve_field<'a, S: AsRef<str>>(
    headers: &'a [S],
    field_name: &str,
    strict: bool,
) -> Option<&'a str> {
    let field = match field_name.split_once('.') {
        Some((_, after)) => after.split('.').next().unwrap_or(after),
        None => field_name,
    };
    let cleaned: String = field.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    let stemmed = stem(&cleaned);

    let lowered: Vec<String> = headers.iter().map(|h| h.as_ref().to_lowercase()).collect();

    if let Some(idx) = lowered.iter().position(|h| h.contains(stemmed.as_str())) {
        return Some(headers[idx].as_ref());
    }
    if strict {
        return None;
    }

    for synonyms in STEMMED_GROUPS.iter() {
        if !synonyms.iter().any(|s| *s == stemmed) {
            continue;
        }
        let hit = lowered
            .iter()
            .position(|h| synonyms.iter().any(|s| h.contains(s.as_str())));
        if let Some(idx) = hit {
            return Some(headers[idx].as_ref());
        }
    }

    None
}
