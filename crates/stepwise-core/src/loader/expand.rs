//! Data-driven expansion: one template, one concrete case per variant.

use crate::model::{Case, Vars};
use crate::render::value_to_string;

/// Key inside a variant map that names the variant instead of overriding context.
pub const VARIANT_NAME_KEY: &str = "desc";

/// Expands `template` into one case per variant.
///
/// Each variant is a deep copy whose context is the template context with the
/// variant's overrides applied (variant wins). Names are `base-variant`; a
/// missing part is replaced by a generated id. No variants yields a single
/// case named `base`.
pub fn expand(template: &Case, base_name: Option<&str>, variants: &[Vars]) -> Vec<Case> {
    let base = base_name
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(generated_id);

    if variants.is_empty() {
        let mut case = template.clone();
        case.name = base;
        return vec![case];
    }

    variants
        .iter()
        .map(|variant| {
            let mut overrides = variant.clone();
            let variant_name = overrides
                .remove(VARIANT_NAME_KEY)
                .filter(|v| !v.is_null())
                .map(|v| value_to_string(&v))
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(generated_id);

            let mut case = template.clone();
            case.name = format!("{base}-{variant_name}");
            for (key, value) in overrides {
                case.context.insert(key, value);
            }
            case
        })
        .collect()
}

/// Short random id used when a case or variant has no name.
pub fn generated_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Step;
    use serde_json::{json, Value};

    fn obj(v: Value) -> Vars {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn one_case_per_variant_with_merged_context() {
        let template = Case::new("ignored", vec![Step::new("s", "log")])
            .with_context(obj(json!({"x": 0, "keep": "yes"})));
        let variants = vec![obj(json!({"desc": "A", "x": 1})), obj(json!({"desc": "B", "x": 2}))];

        let cases = expand(&template, Some("Login"), &variants);
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].name, "Login-A");
        assert_eq!(cases[1].name, "Login-B");
        assert_eq!(cases[0].context.get("x"), Some(&json!(1)));
        assert_eq!(cases[1].context.get("x"), Some(&json!(2)));
        assert_eq!(cases[1].context.get("keep"), Some(&json!("yes")));
        assert!(cases.iter().all(|c| !c.context.contains_key("desc")));
        assert_eq!(template.context.get("x"), Some(&json!(0)));
    }

    #[test]
    fn missing_names_get_generated_ids() {
        let template = Case::new("", vec![]);
        let cases = expand(&template, None, &[obj(json!({"x": 1})), obj(json!({"x": 1}))]);
        assert_eq!(cases.len(), 2);
        assert_ne!(cases[0].name, cases[1].name);
        for case in &cases {
            let (base, variant) = case.name.split_once('-').unwrap();
            assert_eq!(base.len(), 8);
            assert_eq!(variant.len(), 8);
        }
    }

    #[test]
    fn no_variants_keeps_single_case() {
        let template = Case::new("", vec![]);
        let cases = expand(&template, Some("Solo"), &[]);
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].name, "Solo");
    }
}
