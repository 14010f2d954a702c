//! Structural invariants of a generated task graph.

use std::collections::{HashMap, HashSet};

use super::types::TaskDescriptor;

/// Check graph invariants:
/// - No duplicate ids
/// - Every dependency names a task in the graph
/// - Every dependency sits in a strictly earlier phase
/// - No dependency cycles
pub fn validate_graph(tasks: &[TaskDescriptor]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut phases: HashMap<&str, u32> = HashMap::new();

    for task in tasks {
        if phases.insert(task.id.as_str(), task.phase).is_some() {
            errors.push(format!("duplicate id '{}'", task.id));
        }
    }

    for task in tasks {
        for dep in &task.depends_on {
            match phases.get(dep.as_str()) {
                None => errors.push(format!("{}: unknown dependency '{}'", task.id, dep)),
                Some(&dep_phase) if dep_phase >= task.phase => errors.push(format!(
                    "{}: dependency '{}' in phase {} is not before phase {}",
                    task.id, dep, dep_phase, task.phase
                )),
                Some(_) => {}
            }
        }
    }

    if let Some(cycle) = find_cycle(tasks) {
        errors.push(format!("dependency cycle: {}", cycle.join(" -> ")));
    }
    errors
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search for a back edge; returns the cycle path if any.
fn find_cycle(tasks: &[TaskDescriptor]) -> Option<Vec<String>> {
    let edges: HashMap<&str, Vec<&str>> = tasks
        .iter()
        .map(|t| {
            (
                t.id.as_str(),
                t.depends_on.iter().map(String::as_str).collect(),
            )
        })
        .collect();
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut stack: Vec<&str> = Vec::new();

    fn visit<'a>(
        node: &'a str,
        edges: &HashMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        match marks.get(node) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle: Vec<String> =
                    stack[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(node.to_string());
                return Some(cycle);
            }
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        stack.push(node);
        for &dep in edges.get(node).map(Vec::as_slice).unwrap_or(&[]) {
            if let Some(cycle) = visit(dep, edges, marks, stack) {
                return Some(cycle);
            }
        }
        stack.pop();
        marks.insert(node, Mark::Done);
        None
    }

    let mut seen = HashSet::new();
    for task in tasks {
        if !seen.insert(task.id.as_str()) {
            continue;
        }
        if let Some(cycle) = visit(task.id.as_str(), &edges, &mut marks, &mut stack) {
            return Some(cycle);
        }
    }
    None
}
