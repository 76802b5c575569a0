// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Sidebar projection: a pure function mapping workspaces/sessions/
//! workflow-runs plus an active-group filter to the visible subset.
//!
//! Kept dependency-free of `App`/orchestrator state so tests substitute
//! plain fixtures instead of standing up a live session.

/// A workspace grouping, identified by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub id: String,
    pub name: String,
}

/// A session's sidebar-relevant metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMeta {
    pub id: String,
    pub workspace_id: String,
    pub title: String,
    pub dismissed: bool,
}

/// A workflow-run's sidebar-relevant metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowRun {
    pub id: String,
    pub workspace_id: String,
    pub owner_session_id: Option<String>,
}

/// The currently selected group filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveGroup {
    All,
    Workspace(String),
}

/// Options threaded through the projection to mirror the service client's
/// filtered-variant query shape (§6): include dismissed sessions, include
/// workflow-owned sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectionOptions {
    pub include_dismissed: bool,
    pub include_workflow_owned: bool,
}

/// The visible subset of workspaces/sessions/workflow-runs under the
/// current filter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SidebarSnapshot {
    pub workspaces: Vec<Workspace>,
    pub sessions: Vec<SessionMeta>,
    pub workflow_runs: Vec<WorkflowRun>,
}

/// Project the visible sidebar contents for `active_group`.
pub fn project(
    workspaces: &[Workspace],
    sessions: &[SessionMeta],
    workflow_runs: &[WorkflowRun],
    active_group: &ActiveGroup,
    options: ProjectionOptions,
) -> SidebarSnapshot {
    let in_group = |workspace_id: &str| match active_group {
        ActiveGroup::All => true,
        ActiveGroup::Workspace(id) => id == workspace_id,
    };

    let workspaces: Vec<Workspace> = workspaces
        .iter()
        .filter(|w| in_group(&w.id))
        .cloned()
        .collect();

    let owned_session_ids: std::collections::HashSet<&str> = workflow_runs
        .iter()
        .filter_map(|w| w.owner_session_id.as_deref())
        .collect();

    let sessions: Vec<SessionMeta> = sessions
        .iter()
        .filter(|s| in_group(&s.workspace_id))
        .filter(|s| options.include_dismissed || !s.dismissed)
        .filter(|s| options.include_workflow_owned || !owned_session_ids.contains(s.id.as_str()))
        .cloned()
        .collect();

    let workflow_runs: Vec<WorkflowRun> = workflow_runs
        .iter()
        .filter(|w| in_group(&w.workspace_id))
        .cloned()
        .collect();

    SidebarSnapshot { workspaces, sessions, workflow_runs }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixtures() -> (Vec<Workspace>, Vec<SessionMeta>, Vec<WorkflowRun>) {
        let workspaces = vec![
            Workspace { id: "w1".into(), name: "Alpha".into() },
            Workspace { id: "w2".into(), name: "Beta".into() },
        ];
        let sessions = vec![
            SessionMeta { id: "s1".into(), workspace_id: "w1".into(), title: "one".into(), dismissed: false },
            SessionMeta { id: "s2".into(), workspace_id: "w1".into(), title: "two".into(), dismissed: true },
            SessionMeta { id: "s3".into(), workspace_id: "w2".into(), title: "three".into(), dismissed: false },
        ];
        let workflow_runs = vec![WorkflowRun {
            id: "wf1".into(),
            workspace_id: "w1".into(),
            owner_session_id: Some("s1".into()),
        }];
        (workspaces, sessions, workflow_runs)
    }

    #[test]
    fn all_group_includes_every_workspace() {
        let (workspaces, sessions, runs) = fixtures();
        let snap = project(&workspaces, &sessions, &runs, &ActiveGroup::All, ProjectionOptions::default());
        assert_eq!(snap.workspaces.len(), 2);
    }

    #[test]
    fn workspace_filter_narrows_all_three_lists() {
        let (workspaces, sessions, runs) = fixtures();
        let snap = project(
            &workspaces,
            &sessions,
            &runs,
            &ActiveGroup::Workspace("w2".into()),
            ProjectionOptions::default(),
        );
        assert_eq!(snap.workspaces, vec![Workspace { id: "w2".into(), name: "Beta".into() }]);
        assert_eq!(snap.sessions.iter().map(|s| s.id.clone()).collect::<Vec<_>>(), vec!["s3".to_string()]);
        assert!(snap.workflow_runs.is_empty());
    }

    #[test]
    fn dismissed_sessions_excluded_by_default() {
        let (workspaces, sessions, runs) = fixtures();
        let snap = project(&workspaces, &sessions, &runs, &ActiveGroup::All, ProjectionOptions::default());
        assert!(!snap.sessions.iter().any(|s| s.id == "s2"));

        let snap2 = project(
            &workspaces,
            &sessions,
            &runs,
            &ActiveGroup::All,
            ProjectionOptions { include_dismissed: true, ..Default::default() },
        );
        assert!(snap2.sessions.iter().any(|s| s.id == "s2"));
    }

    #[test]
    fn workflow_owned_sessions_excluded_unless_opted_in() {
        let (workspaces, sessions, runs) = fixtures();
        let snap = project(&workspaces, &sessions, &runs, &ActiveGroup::All, ProjectionOptions::default());
        assert!(!snap.sessions.iter().any(|s| s.id == "s1"));

        let snap2 = project(
            &workspaces,
            &sessions,
            &runs,
            &ActiveGroup::All,
            ProjectionOptions { include_workflow_owned: true, ..Default::default() },
        );
        assert!(snap2.sessions.iter().any(|s| s.id == "s1"));
    }
}
