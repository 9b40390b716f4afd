use serde_json::Value;
use std::cmp::Ordering;

use crate::fields::{find_field, FieldDescriptor, FieldType};
use crate::filter::{SortConfig, SortDirection};
use crate::Row;

/// Stable client-side sort for stores that do not sort server-side.
///
/// Null and missing values go last in either direction. Number fields compare
/// numerically, with values that do not parse as numbers grouped after the
/// numeric ones. Other schema fields compare as strings. Fields missing from
/// the schema put JSON numbers (numerically) before everything else.
pub fn sort_rows(rows: &mut [Row], sort: &SortConfig, fields: &[FieldDescriptor]) {
    let numeric = find_field(fields, &sort.field).map(|f| f.field_type == FieldType::Number);
    rows.sort_by(|a, b| compare_rows(a, b, sort, numeric));
}

fn compare_rows(a: &Row, b: &Row, sort: &SortConfig, numeric: Option<bool>) -> Ordering {
    let left = a.get(&sort.field).filter(|v| !v.is_null());
    let right = b.get(&sort.field).filter(|v| !v.is_null());
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(l), Some(r)) => {
            let ord = sort_key(l, numeric).cmp(&sort_key(r, numeric));
            match sort.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        }
    }
}

/// Numbers rank before text, so mixed columns still sort by a total order.
#[derive(Debug)]
enum SortKey {
    Number(f64),
    Text(String),
}

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey {}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Number(x), SortKey::Number(y)) => x.total_cmp(y),
            (SortKey::Number(_), SortKey::Text(_)) => Ordering::Less,
            (SortKey::Text(_), SortKey::Number(_)) => Ordering::Greater,
            (SortKey::Text(x), SortKey::Text(y)) => x.cmp(y),
        }
    }
}

fn sort_key(value: &Value, numeric: Option<bool>) -> SortKey {
    let number = match numeric {
        Some(true) => as_number(value),
        Some(false) => None,
        None => value.as_f64(),
    };
    match number {
        Some(n) => SortKey::Number(n),
        None => SortKey::Text(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(values: Vec<Value>) -> Vec<Row> {
        values
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    fn column(rows: &[Row], field: &str) -> Vec<Value> {
        rows.iter()
            .map(|r| r.get(field).cloned().unwrap_or(Value::Null))
            .collect()
    }

    #[test]
    fn test_nulls_last_descending() {
        let mut data = rows(vec![
            json!({"name": "b"}),
            json!({"name": "a"}),
            json!({"name": null}),
        ]);
        sort_rows(&mut data, &SortConfig::new("name", SortDirection::Desc), &[]);
        assert_eq!(column(&data, "name"), vec![json!("b"), json!("a"), Value::Null]);
    }

    #[test]
    fn test_nulls_and_missing_last_ascending() {
        let mut data = rows(vec![
            json!({"name": null}),
            json!({"other": 1}),
            json!({"name": "b"}),
            json!({"name": "a"}),
        ]);
        sort_rows(&mut data, &SortConfig::new("name", SortDirection::Asc), &[]);
        assert_eq!(
            column(&data, "name"),
            vec![json!("a"), json!("b"), Value::Null, Value::Null]
        );
    }

    #[test]
    fn test_numeric_field_sorts_numerically() {
        let fields = vec![FieldDescriptor::new("priority", FieldType::Number, false)];
        let mut data = rows(vec![
            json!({"priority": 10}),
            json!({"priority": 9}),
            json!({"priority": 100}),
        ]);
        sort_rows(&mut data, &SortConfig::new("priority", SortDirection::Asc), &fields);
        assert_eq!(
            column(&data, "priority"),
            vec![json!(9), json!(10), json!(100)]
        );
    }

    #[test]
    fn test_string_field_sorts_lexicographically() {
        let fields = vec![FieldDescriptor::new("code", FieldType::String, false)];
        let mut data = rows(vec![
            json!({"code": "10"}),
            json!({"code": "9"}),
            json!({"code": "100"}),
        ]);
        sort_rows(&mut data, &SortConfig::new("code", SortDirection::Asc), &fields);
        assert_eq!(
            column(&data, "code"),
            vec![json!("10"), json!("100"), json!("9")]
        );
    }

    #[test]
    fn test_sort_is_stable() {
        let mut data = rows(vec![
            json!({"k": 1, "id": "first"}),
            json!({"k": 0, "id": "zero"}),
            json!({"k": 1, "id": "second"}),
        ]);
        sort_rows(&mut data, &SortConfig::new("k", SortDirection::Desc), &[]);
        assert_eq!(
            column(&data, "id"),
            vec![json!("first"), json!("second"), json!("zero")]
        );
    }

    #[test]
    fn test_mixed_column_sorts_numbers_before_text() {
        let mut data = rows(vec![
            json!({"v": "1x"}),
            json!({"v": 10}),
            json!({"v": "abc"}),
            json!({"v": 2}),
        ]);
        sort_rows(&mut data, &SortConfig::new("v", SortDirection::Asc), &[]);
        assert_eq!(
            column(&data, "v"),
            vec![json!(2), json!(10), json!("1x"), json!("abc")]
        );
    }

    #[test]
    fn test_number_field_groups_unparseable_values_last() {
        let fields = vec![FieldDescriptor::new("priority", FieldType::Number, true)];
        let mut data = rows(vec![
            json!({"priority": "high"}),
            json!({"priority": 10}),
            json!({"priority": "3"}),
            json!({"priority": 2}),
            json!({"priority": "1x"}),
        ]);
        sort_rows(&mut data, &SortConfig::new("priority", SortDirection::Desc), &fields);
        assert_eq!(
            column(&data, "priority"),
            vec![json!("high"), json!("1x"), json!(10), json!("3"), json!(2)]
        );
    }

    #[test]
    fn test_large_mixed_column_is_ordered() {
        let values: Vec<Value> = (0..400)
            .map(|i| match i % 4 {
                0 => json!({"v": i}),
                1 => json!({"v": format!("{}x", i)}),
                2 => json!({"v": i as f64 / 3.0}),
                _ => json!({"v": format!("{}", 400 - i)}),
            })
            .collect();
        let mut data = rows(values);
        sort_rows(&mut data, &SortConfig::new("v", SortDirection::Asc), &[]);

        let keys: Vec<SortKey> = data.iter().map(|r| sort_key(&r["v"], None)).collect();
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
        let first_text = keys.iter().position(|k| matches!(k, SortKey::Text(_))).unwrap();
        assert!(keys[first_text..].iter().all(|k| matches!(k, SortKey::Text(_))));
        assert_eq!(first_text, 200);
    }
}
