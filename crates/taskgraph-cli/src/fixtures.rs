use std::sync::Arc;

use taskgraph_core::{Scheduler, SharedState, StartError, TaskBody, TaskOutcome};

/// One entry in the built-in demo graph. Mirrors the shape a real loader
/// collaborator would hand to `Scheduler::register`.
pub struct FixtureTask {
    pub name: &'static str,
    pub after: Vec<&'static str>,
    pub tags: Vec<&'static str>,
}

/// A small diamond-shaped demo graph, one tag per layer: `a` has no
/// predecessors; `b` and `c` depend on `a`; `d` and `e` depend on `c`; `f`
/// depends on both `b` and `d`. Each task's body records a dot-joined
/// summary of its own name and its predecessors' recorded results.
pub fn demo_graph() -> Vec<FixtureTask> {
    vec![
        FixtureTask { name: "a", after: vec![], tags: vec!["layer1"] },
        FixtureTask { name: "b", after: vec!["a"], tags: vec!["layer2"] },
        FixtureTask { name: "c", after: vec!["a"], tags: vec!["layer2"] },
        FixtureTask { name: "d", after: vec!["c"], tags: vec!["layer3"] },
        FixtureTask { name: "e", after: vec!["c"], tags: vec!["layer3"] },
        FixtureTask { name: "f", after: vec!["b", "d"], tags: vec!["layer3"] },
    ]
}

/// Register `fixtures` onto `scheduler`, filtered by `tags` (empty means
/// "all"). `after` edges pointing at filtered-out tasks are stripped rather
/// than rejected, per the discovery collaborator contract.
pub fn register_filtered(
    scheduler: &mut Scheduler,
    fixtures: &[FixtureTask],
    tags: &[String],
) -> Result<(), StartError> {
    let selected: Vec<&FixtureTask> = fixtures
        .iter()
        .filter(|t| tags.is_empty() || t.tags.iter().any(|tag| tags.iter().any(|want| want == tag)))
        .collect();
    let selected_names: std::collections::HashSet<&str> =
        selected.iter().map(|t| t.name).collect();

    for task in &selected {
        let after: Vec<String> = task
            .after
            .iter()
            .filter(|dep| selected_names.contains(*dep))
            .map(|dep| dep.to_string())
            .collect();

        let body = dot_join_body(task.name, after.clone());
        scheduler.register(
            task.name,
            body,
            after,
            task.tags.iter().map(|t| t.to_string()).collect(),
        )?;
    }
    Ok(())
}

fn dot_join_body(name: &'static str, after: Vec<String>) -> TaskBody {
    TaskBody::WithState(Arc::new(move |state: &SharedState| -> TaskOutcome {
        if after.is_empty() {
            return Ok(serde_json::Value::String(name.to_string()));
        }
        let results = state.get("results").unwrap_or(serde_json::Value::Null);
        let joined = after
            .iter()
            .map(|dep| {
                results
                    .get(dep)
                    .and_then(|v| v.as_str())
                    .unwrap_or("?")
                    .to_string()
            })
            .collect::<Vec<_>>()
            .join("|");
        Ok(serde_json::Value::String(format!("{name}.{joined}")))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskgraph_core::{SchedulerConfig, TaskStatus};

    #[test]
    fn tag_filter_strips_edges_to_excluded_tasks() {
        let mut scheduler = Scheduler::new(
            SchedulerConfig::default(),
            SharedState::new(Default::default(), Default::default()).unwrap(),
        );
        register_filtered(&mut scheduler, &demo_graph(), &["layer2".to_string()]).unwrap();
        assert_eq!(scheduler.graph().nodes().len(), 2);
        assert!(scheduler.graph().task("b").unwrap().after.is_empty());
    }

    #[test]
    fn full_demo_graph_runs_to_the_diamond_outcome() {
        let scheduler = {
            let mut s = Scheduler::new(
                SchedulerConfig::default(),
                SharedState::new(Default::default(), Default::default()).unwrap(),
            );
            register_filtered(&mut s, &demo_graph(), &[]).unwrap();
            s
        };
        let summary = scheduler.start().unwrap();
        let status_of = |n: &str| summary.tasks.iter().find(|t| t.name == n).unwrap().status;
        assert_eq!(status_of("a"), TaskStatus::Passed);
        assert_eq!(status_of("f"), TaskStatus::Passed);
        let e = summary.tasks.iter().find(|t| t.name == "e").unwrap();
        assert_eq!(e.result, Some(serde_json::json!("e.c.a")));
    }
}
