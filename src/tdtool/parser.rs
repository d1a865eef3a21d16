//! Parser for tdtool listing output
//!
//! tdtool prints one record per line, fields separated by tabs and each
//! field written as `key=value`:
//!
//! ```text
//! type=device	id=1	name=Lamp1	model=selflearning-switch:nexa	lastsentcommand=ON
//! type=sensor	protocol=fineoffset	model=temperaturehumidity	id=135	temperature=21.5	humidity=40	age=3
//! ```

use std::collections::BTreeMap;

const LINE_DELIMITER: char = '\n';
const PAIR_DELIMITER: char = '\t';

/// One parsed line of tdtool output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub id: i64,
    /// Every field except `id`, values kept as text
    pub fields: BTreeMap<String, String>,
}

/// Parse tdtool output into records
///
/// Fields without `=` or with an empty key are ignored. Only the first `=`
/// separates key from value. Lines without a positive integer `id` are
/// dropped.
pub fn parse_records(output: &str) -> Vec<RawRecord> {
    output
        .split(LINE_DELIMITER)
        .filter_map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> Option<RawRecord> {
    let mut id = None;
    let mut fields = BTreeMap::new();

    for pair in line.trim_end_matches('\r').split(PAIR_DELIMITER) {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        if key == "id" {
            id = parse_id(value);
        } else {
            fields.insert(key.to_string(), value.to_string());
        }
    }

    id.map(|id| RawRecord { id, fields })
}

/// tdtool ids start at 1; zero or garbage means the line carried no usable id
fn parse_id(value: &str) -> Option<i64> {
    value.trim().parse::<i64>().ok().filter(|id| *id > 0)
}
