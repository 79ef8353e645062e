//! Structural validation of policy inputs on the write path.

use crate::condition::{ActionCondition, ResourceCondition, ResourceTypeSelector, WILDCARD};
use crate::error::{PolicyError, PolicyResult};
use crate::types::{NewPolicy, PolicyChanges};

pub const MAX_NAME_LENGTH: usize = 128;
pub const MAX_DESCRIPTION_LENGTH: usize = 1024;

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// `"*"` or `"<entity>:<verb>"`, e.g. `"journal_entry:post"`.
pub fn is_valid_action_identifier(action: &str) -> bool {
    if action == WILDCARD {
        return true;
    }
    match action.split_once(':') {
        Some((entity, verb)) => is_identifier(entity) && is_identifier(verb),
        None => false,
    }
}

pub fn is_valid_resource_type(resource_type: &str) -> bool {
    resource_type == WILDCARD || is_identifier(resource_type)
}

fn check_name(name: &str, errors: &mut Vec<String>) {
    if name.trim().is_empty() {
        errors.push("name must not be empty".to_string());
    } else if name.chars().count() > MAX_NAME_LENGTH {
        errors.push(format!("name exceeds {} characters", MAX_NAME_LENGTH));
    }
}

fn check_description(description: &str, errors: &mut Vec<String>) {
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        errors.push(format!(
            "description exceeds {} characters",
            MAX_DESCRIPTION_LENGTH
        ));
    }
}

fn check_resource(resource: &ResourceCondition, errors: &mut Vec<String>) {
    if let ResourceTypeSelector::Exact(t) = &resource.resource_type {
        if !is_valid_resource_type(t) {
            errors.push(format!("invalid resource type '{}'", t));
        }
    }
}

fn check_actions(action: &ActionCondition, errors: &mut Vec<String>) {
    for a in &action.actions {
        if !is_valid_action_identifier(a) {
            errors.push(format!(
                "invalid action identifier '{}' (expected \"<entity>:<verb>\" or \"*\")",
                a
            ));
        }
    }
}

fn finish(errors: Vec<String>) -> PolicyResult<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(PolicyError::Validation(errors.join("; ")))
    }
}

pub fn validate_new_policy(input: &NewPolicy) -> PolicyResult<()> {
    let mut errors = Vec::new();
    check_name(&input.name, &mut errors);
    check_description(&input.description, &mut errors);
    check_resource(&input.resource, &mut errors);
    check_actions(&input.action, &mut errors);
    finish(errors)
}

pub fn validate_changes(changes: &PolicyChanges) -> PolicyResult<()> {
    let mut errors = Vec::new();
    if let Some(name) = &changes.name {
        check_name(name, &mut errors);
    }
    if let Some(description) = &changes.description {
        check_description(description, &mut errors);
    }
    if let Some(resource) = &changes.resource {
        check_resource(resource, &mut errors);
    }
    if let Some(action) = &changes.action {
        check_actions(action, &mut errors);
    }
    finish(errors)
}
