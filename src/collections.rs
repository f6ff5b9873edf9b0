use serde_json::Value;
use std::collections::HashMap;
use std::hash::Hash;

/// Looks each key up in `map`, yielding `default` for the absent ones.
/// Results come back in key order.
pub fn values_or_default<K, V>(map: &HashMap<K, V>, keys: &[K], default: V) -> Vec<V>
where
    K: Eq + Hash,
    V: Clone,
{
    keys.iter().map(|key| map.get(key).cloned().unwrap_or_else(|| default.clone())).collect()
}

/// Flattens a nested JSON tree into dotted-path leaves:
/// objects recurse as `parent.child`, arrays as `parent[i]`.
pub fn flatten_json(value: &Value) -> Vec<(String, Value)> {
    flatten_json_with(value, ".")
}

/// [`flatten_json`] with a caller-chosen key separator.
pub fn flatten_json_with(value: &Value, separator: &str) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    flatten_into(value, "", separator, &mut out);
    out
}

fn flatten_into(value: &Value, prefix: &str, separator: &str, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            if map.is_empty() {
                out.push((prefix.to_string(), value.clone()));
                return;
            }
            for (key, child) in map {
                let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}{separator}{key}") };
                flatten_into(child, &path, separator, out);
            }
        }
        Value::Array(items) => {
            if items.is_empty() {
                out.push((prefix.to_string(), value.clone()));
                return;
            }
            for (i, child) in items.iter().enumerate() {
                flatten_into(child, &format!("{prefix}[{i}]"), separator, out);
            }
        }
        leaf => out.push((prefix.to_string(), leaf.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // 1) Absent keys fall back to the default, present ones come through.
    #[test]
    fn lookups_fall_back_to_default() {
        let mut map = HashMap::new();
        map.insert("a", 1);
        map.insert("c", 3);
        assert_eq!(values_or_default(&map, &["a", "b", "c"], 0), vec![1, 0, 3]);
    }

    // 2) Objects flatten to dotted paths, arrays to bracketed indices.
    #[test]
    fn nested_trees_flatten_to_paths() {
        let tree = json!({
            "server": { "host": "localhost", "port": 8080 },
            "peers": [ { "name": "a" }, { "name": "b" } ],
            "debug": true
        });
        let mut flat = flatten_json(&tree);
        flat.sort_by(|(a, _), (b, _)| a.cmp(b));
        assert_eq!(
            flat,
            vec![
                ("debug".to_string(), json!(true)),
                ("peers[0].name".to_string(), json!("a")),
                ("peers[1].name".to_string(), json!("b")),
                ("server.host".to_string(), json!("localhost")),
                ("server.port".to_string(), json!(8080)),
            ]
        );
    }

    // 3) Empty containers survive as leaves instead of vanishing.
    #[test]
    fn empty_containers_are_kept() {
        let tree = json!({ "a": {}, "b": [] });
        let mut flat = flatten_json_with(&tree, "/");
        flat.sort_by(|(a, _), (b, _)| a.cmp(b));
        assert_eq!(flat, vec![("a".to_string(), json!({})), ("b".to_string(), json!([]))]);
    }
}
