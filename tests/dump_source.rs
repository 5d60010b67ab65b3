mod common;

use std::sync::Arc;

use compliance_unify::model::Applicability;
use compliance_unify::source::RequirementSource;
use compliance_unify::source::dump::{load_dump, parse_dump};
use compliance_unify::{CategoryId, FrameworkId, FrameworkSelection};

use common::{fallback_engine, memory_cache};

fn requirement_row(
    id: &str,
    standard: &str,
    code: &str,
    title: &str,
    text: &str,
    section: &str,
) -> String {
    format!(
        "{id}\t{standard}\t{code}\t{title}\t{text}\t\\N\tmedium\t\\N\t1\tx\tx\tt\t\\N\t\\N\t\\N\t\\N\t{section}"
    )
}

fn dump() -> String {
    let standards = [
        "s-iso\tISO/IEC 27001\t2022",
        "s-ig1\tCIS Controls IG1\tv8",
        "s-ig2\tCIS Controls IG2\tv8",
        "s-ig3\tCIS Controls IG3\tv8",
    ]
    .join("\n");
    let requirements = [
        requirement_row(
            "r1",
            "s-iso",
            "5.15",
            "Access control",
            "Rules to control access to information shall be established and reviewed annually.",
            "Organizational controls",
        ),
        requirement_row(
            "r2",
            "s-ig1",
            "6.1",
            "Establish an access granting process",
            "Establish and follow a process for granting access to enterprise assets.",
            "\\N",
        ),
        requirement_row(
            "r3",
            "s-ig2",
            "6.1",
            "Establish an access granting process",
            "Establish and follow a process for granting access to enterprise assets.",
            "\\N",
        ),
        requirement_row(
            "r4",
            "s-ig3",
            "6.8",
            "Define and maintain role-based access control",
            "Define and maintain role-based access control for all enterprise assets.",
            "\\N",
        ),
    ]
    .join("\n");
    format!(
        "SET statement_timeout = 0;\n\nCOPY public.standards_library (id, name, version) FROM stdin;\n{standards}\n\\.\n\nCOPY public.requirements_library (id, standard_id, control_id) FROM stdin;\n{requirements}\n\\.\n"
    )
}

#[test]
fn test_dump_folds_groups_and_keeps_lowest_tier() {
    let source = parse_dump(&dump()).unwrap();
    let cis = FrameworkId::new("cis-controls-v8");
    let framework = source
        .frameworks()
        .into_iter()
        .find(|f| f.id == cis)
        .unwrap();
    assert_eq!(framework.max_tier(), Some(3));

    let all = source.list_requirements(&cis, None).unwrap();
    assert_eq!(all.len(), 2);
    let granting = all.iter().find(|r| r.code == "6.1").unwrap();
    assert_eq!(granting.tier, Some(1));
    assert_eq!(source.list_requirements(&cis, Some(2)).unwrap().len(), 1);
}

#[test]
fn test_load_dump_reads_from_disk() {
    let dir = std::env::temp_dir().join(format!("unify-dump-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("backup.sql");
    std::fs::write(&path, dump()).unwrap();

    let source = load_dump(&path).unwrap();
    assert_eq!(source.frameworks().len(), 2);
    assert_eq!(source.len(), 3);

    std::fs::remove_dir_all(&dir).ok();
    assert!(load_dump(&path).is_err());
}

#[tokio::test]
async fn test_generate_from_dump() {
    let source = Arc::new(parse_dump(&dump()).unwrap());
    let engine = fallback_engine(source, memory_cache());
    let selection =
        FrameworkSelection::parse_specs(&["iso-iec-27001-2022", "cis-controls-v8:1"]).unwrap();
    let generation = engine.generate(&selection).await.unwrap();

    let access = generation
        .content(&CategoryId::new("access_control"))
        .unwrap();
    let codes: Vec<&str> = access.requirements.iter().map(|r| r.code.as_str()).collect();
    assert!(codes.contains(&"5.15"));
    assert!(codes.contains(&"6.1"));
    assert!(!codes.contains(&"6.8"), "tier 3 control outside selection");

    let text = access.text().unwrap();
    assert!(text.contains("Organizational controls"));
    assert!(text.contains("annually"));
    assert!(
        access
            .framework_references
            .iter()
            .all(|r| r.applicability == Applicability::Mapped)
    );
}
