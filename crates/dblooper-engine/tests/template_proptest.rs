use proptest::prelude::*;

use dblooper_db::ParamStyle;
use dblooper_engine::template::{column_references, compile, CompileOptions};
use dblooper_engine::variables::{MapResolver, NoVariables};

fn column_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,7}"
}

fn template_for(columns: &[String]) -> String {
    columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("c{i} = #{{{c}}}#"))
        .collect::<Vec<_>>()
        .join(" AND ")
}

proptest! {
    #[test]
    fn one_marker_per_column_reference(columns in prop::collection::vec(column_name(), 0..12)) {
        let template = format!("SELECT * FROM t WHERE {}", template_for(&columns));
        let stmt = compile(&template, None, &NoVariables, &CompileOptions::default()).unwrap();

        prop_assert_eq!(stmt.sql.matches('?').count(), columns.len());
        prop_assert_eq!(&stmt.column_refs, &columns);
        prop_assert_eq!(column_references(&template), columns);
    }

    #[test]
    fn dollar_markers_are_numbered_in_order(columns in prop::collection::vec(column_name(), 1..12)) {
        let opts = CompileOptions {
            param_style: ParamStyle::Dollar,
            ..CompileOptions::default()
        };
        let stmt = compile(&template_for(&columns), None, &NoVariables, &opts).unwrap();

        let mut cursor = 0;
        for n in 1..=columns.len() {
            let marker = format!("${n}");
            let found = stmt.sql[cursor..].find(&marker);
            prop_assert!(found.is_some(), "missing {} in {}", marker, stmt.sql);
            cursor += found.unwrap_or_default() + marker.len();
        }
        prop_assert_eq!(stmt.param_count(), columns.len());
    }

    #[test]
    fn substituted_text_is_never_rescanned(value in "[#{}a-z$]{0,16}", upstream in "[#{}a-z ]{0,16}") {
        let resolver = MapResolver::default().with("v", value.as_str());
        let template = "SELECT '$${Sv}$$' FROM #table# WHERE id = #{id}#";
        let stmt = compile(template, Some(upstream.as_str()), &resolver, &CompileOptions::default()).unwrap();

        prop_assert_eq!(stmt.column_refs, vec!["id".to_string()]);
        prop_assert_eq!(
            stmt.sql,
            format!("SELECT '{value}' FROM ({upstream}) WHERE id = ?")
        );
    }
}
