use crate::config::OutputFields;
use crate::probe::{FieldDef, FieldRecord, FieldValue};

/// Maps a probe module's field record onto the user's requested output
/// schema: `*` keeps the module's declared order, an explicit list
/// reorders/subsets it (spec.md §6 "Output schema").
pub fn translate<'a>(
    record: &'a FieldRecord,
    output_fields: &OutputFields,
    declared: &[FieldDef],
) -> Vec<(&'static str, &'a FieldValue)> {
    let names: Vec<&'static str> = match output_fields {
        OutputFields::All => declared.iter().map(|f| f.name).collect(),
        OutputFields::Explicit(requested) => requested
            .iter()
            .filter_map(|name| declared.iter().find(|f| f.name == name).map(|f| f.name))
            .collect(),
    };
    names.into_iter().filter_map(|name| record.get(name).map(|v| (name, v))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::FieldKind;

    fn declared() -> Vec<FieldDef> {
        vec![
            FieldDef { name: "classification", kind: FieldKind::String, description: "" },
            FieldDef { name: "success", kind: FieldKind::Bool, description: "" },
            FieldDef { name: "saddr", kind: FieldKind::String, description: "" },
        ]
    }

    fn sample_record() -> FieldRecord {
        let mut r = FieldRecord::new();
        r.push("classification", FieldValue::Str("synack".into()));
        r.push("success", FieldValue::Bool(true));
        r.push("saddr", FieldValue::Str("1.2.3.4".into()));
        r
    }

    #[test]
    fn all_keeps_declared_order() {
        let record = sample_record();
        let out = translate(&record, &OutputFields::All, &declared());
        let names: Vec<_> = out.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["classification", "success", "saddr"]);
    }

    #[test]
    fn explicit_list_reorders_and_subsets() {
        let record = sample_record();
        let fields = OutputFields::Explicit(vec!["saddr".into(), "classification".into()]);
        let out = translate(&record, &fields, &declared());
        let names: Vec<_> = out.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["saddr", "classification"]);
    }
}
