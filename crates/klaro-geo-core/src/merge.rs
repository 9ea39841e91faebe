// crates/klaro-geo-core/src/merge.rs
use serde_json::{Map, Value};

/// Deep-merge `overlay` onto `base`.
///
/// Objects merge key-by-key, recursively. Anything else in `overlay`
/// (scalars, arrays, `null`) replaces whatever `base` held at that key.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            merge_maps(base_map, overlay_map);
        }
        (slot, value) => {
            *slot = value.clone();
        }
    }
}

/// Map-level variant of [`deep_merge`].
pub fn merge_maps(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match base.get_mut(key) {
            Some(existing) => deep_merge(existing, value),
            None => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Fold a sequence of layers, least specific first, into one object.
pub fn merge_layers<'a, I>(layers: I) -> Value
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut acc = Value::Object(Map::new());
    for layer in layers {
        deep_merge(&mut acc, layer);
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn objects_merge_recursively() {
        let mut base = json!({
            "styling": { "theme": ["light", "bottom"], "accent": "blue" },
            "translations": { "en": { "title": "Cookies" } }
        });
        deep_merge(
            &mut base,
            &json!({
                "styling": { "theme": ["dark"] },
                "translations": { "de": { "title": "Kekse" } }
            }),
        );
        assert_eq!(
            base,
            json!({
                "styling": { "theme": ["dark"], "accent": "blue" },
                "translations": {
                    "en": { "title": "Cookies" },
                    "de": { "title": "Kekse" }
                }
            })
        );
    }

    #[test]
    fn scalar_over_object_replaces() {
        let mut base = json!({ "a": { "b": 1 } });
        deep_merge(&mut base, &json!({ "a": false }));
        assert_eq!(base, json!({ "a": false }));

        let mut base = json!({ "a": 1 });
        deep_merge(&mut base, &json!({ "a": { "b": 2 } }));
        assert_eq!(base, json!({ "a": { "b": 2 } }));
    }

    #[test]
    fn layers_fold_in_order() {
        let a = json!({ "title": "A", "x": 1 });
        let b = json!({ "title": "B" });
        assert_eq!(merge_layers([&a, &b]), json!({ "title": "B", "x": 1 }));
        assert_eq!(merge_layers(std::iter::empty()), json!({}));
    }
}
