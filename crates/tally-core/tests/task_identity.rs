use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use tally_core::model::task::SEED_LEN;
use tally_core::model::{seed_for, select_template, TaskDescriptor, TaskTemplate};

fn templates() -> Vec<TaskTemplate> {
    ["calculator", "markdown-preview", "weather-card"]
        .iter()
        .map(|id| TaskTemplate {
            id: (*id).to_string(),
            brief: format!("Build {}", id),
            checks: Vec::new(),
        })
        .collect()
}

proptest! {
    #[test]
    fn seed_is_stable_hex_of_fixed_length(submitter in "[a-z0-9._%+-]{1,24}@[a-z0-9.-]{1,16}", template in "[a-z-]{1,20}") {
        let a = seed_for(&submitter, &template);
        let b = seed_for(&submitter, &template);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.len(), SEED_LEN);
        prop_assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn reissuing_keeps_task_id_but_not_nonce(submitter in "[a-z]{1,12}@example\\.com", round in 1u32..4) {
        let templates = templates();
        let template = select_template(&submitter, &templates).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let first = TaskDescriptor::issue(&submitter, template, round, now);
        let again = TaskDescriptor::issue(&submitter, template, round, now);
        prop_assert_eq!(&first.task_id, &again.task_id);
        prop_assert!(first.task_id.starts_with(&template.id));
        prop_assert_ne!(first.nonce, again.nonce);
    }
}

#[test]
fn template_selection_is_deterministic() {
    let templates = templates();
    let a = select_template("student@example.com", &templates).map(|t| t.id.clone());
    let b = select_template("student@example.com", &templates).map(|t| t.id.clone());
    assert_eq!(a, b);
    assert!(select_template("student@example.com", &[]).is_none());
}
