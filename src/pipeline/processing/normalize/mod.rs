//! Key normalization: null sentinels, identifier canonicalisation and the
//! derived taxon key used to group records describing the same taxon.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use crate::constants::{APHIA_ID, IDENTIFIER_COLUMNS, NCBI_TAXON_ID, NULL_SENTINELS, SCIENTIFIC_NAME};
use crate::domain::{format_number, Record, Table, Value};

/// Whether a raw cell stands for "missing"
pub fn is_null_sentinel(raw: &str) -> bool {
    let trimmed = raw.trim();
    NULL_SENTINELS.iter().any(|s| trimmed.eq_ignore_ascii_case(s))
}

/// Normalize an identifier cell. Sentinels map to `None`; integer-like values
/// written as floats or in exponent form (`9606.0`, `1.2345678e8`) are
/// rendered as plain integers; anything else passes through trimmed.
pub fn normalize_identifier(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if is_null_sentinel(trimmed) {
        return None;
    }
    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Some(trimmed.to_string());
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() && n.fract() == 0.0 => Some(format_number(n)),
        _ => Some(trimmed.to_string()),
    }
}

/// Lower-case a scientific name and collapse internal whitespace runs
pub fn normalize_scientific_name(raw: &str) -> Option<String> {
    if is_null_sentinel(raw) {
        return None;
    }
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(collapsed.to_lowercase())
}

/// Null out sentinel text cells and trim the rest
pub fn normalize_value(value: &Value) -> Value {
    match value {
        Value::Text(s) if is_null_sentinel(s) => Value::Null,
        Value::Text(s) => Value::Text(s.trim().to_string()),
        other => other.clone(),
    }
}

/// Identifier-column flavour of [`normalize_value`]
pub fn normalize_identifier_value(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Number(n) => Value::Text(format_number(*n)),
        Value::Text(s) => normalize_identifier(s).map(Value::Text).unwrap_or(Value::Null),
    }
}

/// Token two join-key cells are compared on: identifier canonicalisation
/// followed by name normalization. `None` never matches anything.
pub fn join_token(value: &Value) -> Option<String> {
    value
        .as_text()
        .and_then(|s| normalize_identifier(&s))
        .and_then(|s| normalize_scientific_name(&s))
}

/// Derived identifier for one biological taxon.
///
/// The namespace prefix keeps an NCBI id and an Aphia id sharing the same
/// digits apart. Records with no identifier and no name are keyed by their
/// row position so they never collapse into each other.
///
/// [`taxon_key`] looks at one record only: a row carrying both ids and a row
/// carrying just the Aphia id get different keys. [`resolve_taxon_keys`]
/// links such rows across a whole table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaxonKey {
    Ncbi(String),
    Aphia(String),
    Name(String),
    Row(usize),
}

impl fmt::Display for TaxonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaxonKey::Ncbi(id) => write!(f, "ncbi:{}", id),
            TaxonKey::Aphia(id) => write!(f, "aphia:{}", id),
            TaxonKey::Name(name) => write!(f, "name:{}", name),
            TaxonKey::Row(index) => write!(f, "row:{}", index),
        }
    }
}

/// NCBI id, else Aphia id, else normalized scientific name, else row position
pub fn taxon_key(record: &Record, row_index: usize) -> TaxonKey {
    let identifier = |field: &str| {
        record
            .get(field)
            .as_text()
            .and_then(|s| normalize_identifier(&s))
    };

    if let Some(id) = identifier(NCBI_TAXON_ID) {
        return TaxonKey::Ncbi(id);
    }
    if let Some(id) = identifier(APHIA_ID) {
        return TaxonKey::Aphia(id);
    }
    record
        .get(SCIENTIFIC_NAME)
        .as_text()
        .and_then(|s| normalize_scientific_name(&s))
        .map(TaxonKey::Name)
        .unwrap_or(TaxonKey::Row(row_index))
}

impl TaxonKey {
    fn priority(&self) -> u8 {
        match self {
            TaxonKey::Ncbi(_) => 0,
            TaxonKey::Aphia(_) => 1,
            TaxonKey::Name(_) => 2,
            TaxonKey::Row(_) => 3,
        }
    }
}

fn find_root(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Taxon keys for every row of `table`, with rows that share an NCBI or Aphia
/// id (directly or through a chain of rows) collapsed onto one key. A group
/// takes the highest-priority key among its rows, earliest row first.
pub fn resolve_taxon_keys(table: &Table) -> Vec<TaxonKey> {
    let own: Vec<TaxonKey> = table
        .iter()
        .enumerate()
        .map(|(i, row)| taxon_key(row, i))
        .collect();
    let mut parent: Vec<usize> = (0..own.len()).collect();

    let mut first_row: HashMap<(&str, String), usize> = HashMap::new();
    for (i, row) in table.iter().enumerate() {
        for field in IDENTIFIER_COLUMNS {
            let Some(id) = row.get(field).as_text().and_then(|s| normalize_identifier(&s)) else {
                continue;
            };
            match first_row.entry((field, id)) {
                Entry::Occupied(seen) => {
                    let a = find_root(&mut parent, *seen.get());
                    let b = find_root(&mut parent, i);
                    if a != b {
                        parent[a.max(b)] = a.min(b);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(i);
                }
            }
        }
    }

    let mut group_key: HashMap<usize, TaxonKey> = HashMap::new();
    for (i, key) in own.iter().enumerate() {
        let root = find_root(&mut parent, i);
        match group_key.entry(root) {
            Entry::Occupied(mut best) => {
                if key.priority() < best.get().priority() {
                    best.insert(key.clone());
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(key.clone());
            }
        }
    }

    (0..own.len())
        .map(|i| {
            let root = find_root(&mut parent, i);
            group_key.get(&root).cloned().unwrap_or_else(|| own[i].clone())
        })
        .collect()
}
