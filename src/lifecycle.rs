//! Manuscript status workflow.
//!
//! ```text
//! PENDING ──► UNDER_REVIEW ──► ACCEPTED ──► PUBLISHED
//!    │  └───────────────────────►▲
//!    └────────► REJECTED ◄───────┘ (from PENDING or UNDER_REVIEW)
//! ```
//!
//! Planning is pure: `plan_transition` decides what a request would change
//! without touching storage. The repository applies the plan as a single
//! conditional update keyed on the status the plan was computed from.

use crate::{
    errors::AppError,
    models::article::{Article, ArticleStatus, IssueAssignment},
};
use chrono::{DateTime, Utc};

impl ArticleStatus {
    /// Statuses reachable in one step.
    pub fn successors(&self) -> &'static [ArticleStatus] {
        match self {
            ArticleStatus::Pending => &[
                ArticleStatus::UnderReview,
                ArticleStatus::Accepted,
                ArticleStatus::Rejected,
            ],
            ArticleStatus::UnderReview => &[ArticleStatus::Accepted, ArticleStatus::Rejected],
            ArticleStatus::Accepted => &[ArticleStatus::Published],
            ArticleStatus::Published | ArticleStatus::Rejected => &[],
        }
    }

    pub fn can_transition_to(&self, to: ArticleStatus) -> bool {
        self.successors().contains(&to)
    }

    pub fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }
}

/// Column changes produced by a valid, non-trivial transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub from: ArticleStatus,
    pub to: ArticleStatus,
    /// Only written when the stored value is still NULL.
    pub accepted_at: Option<DateTime<Utc>>,
    /// Only written when the stored value is still NULL.
    pub published_at: Option<DateTime<Utc>>,
    pub issue: Option<IssueAssignment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransitionPlan {
    /// Requested status equals the stored one.
    Unchanged,
    Apply(StatusChange),
}

/// Decides whether `article` may move to `to` and what that move writes.
///
/// `expected` is the status the caller last observed; a mismatch means
/// someone else moved the article first.
pub fn plan_transition(
    article: &Article,
    to: ArticleStatus,
    expected: Option<ArticleStatus>,
    issue: &IssueAssignment,
    now: DateTime<Utc>,
) -> Result<TransitionPlan, AppError> {
    let from = article.status;

    if from == to {
        return Ok(TransitionPlan::Unchanged);
    }

    if let Some(expected) = expected {
        if expected != from {
            return Err(AppError::Conflict(format!(
                "Article {} is currently {}, not {}",
                article.id, from, expected
            )));
        }
    }

    if !from.can_transition_to(to) {
        return Err(AppError::InvalidTransition { from, to });
    }

    let issue = if to == ArticleStatus::Published {
        validate_issue_assignment(issue)?;
        (!issue.is_empty()).then(|| issue.clone())
    } else {
        if !issue.is_empty() {
            return Err(AppError::invalid(
                "volumeNo",
                "Issue placement can only be set when publishing",
            ));
        }
        None
    };

    Ok(TransitionPlan::Apply(StatusChange {
        from,
        to,
        accepted_at: (to == ArticleStatus::Accepted && article.accepted_at.is_none())
            .then_some(now),
        published_at: (to == ArticleStatus::Published && article.published_at.is_none())
            .then_some(now),
        issue,
    }))
}

/// Volume, issue and year travel together; a month alone is allowed.
pub fn validate_issue_assignment(issue: &IssueAssignment) -> Result<(), AppError> {
    let present = [
        ("volumeNo", &issue.volume_no),
        ("issueNo", &issue.issue_no),
        ("year", &issue.year),
    ];
    let given = present
        .iter()
        .filter(|(_, v)| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
        .count();

    if given != 0 && given != present.len() {
        let missing: Vec<_> = present
            .iter()
            .filter(|(_, v)| v.as_deref().map_or(true, |s| s.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect();
        return Err(AppError::invalid(
            missing[0],
            format!(
                "volumeNo, issueNo and year must be given together (missing: {})",
                missing.join(", ")
            ),
        ));
    }

    if let Some(year) = issue.year.as_deref().filter(|y| !y.trim().is_empty()) {
        if year.trim().parse::<u16>().is_err() {
            return Err(AppError::invalid("year", "Year must be a number"));
        }
    }
    Ok(())
}

/// Timestamps implied by creating an article directly in `status`.
pub fn initial_timestamps(
    status: ArticleStatus,
    now: DateTime<Utc>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    match status {
        ArticleStatus::Accepted => (Some(now), None),
        ArticleStatus::Published => (None, Some(now)),
        _ => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn article(status: ArticleStatus) -> Article {
        Article {
            id: 7,
            journal_id: 1,
            title: "Test Paper".to_string(),
            abstract_text: "Abstract".to_string(),
            keywords: None,
            article_type: None,
            status,
            issue: IssueAssignment::default(),
            pdf_url: None,
            word_url: None,
            submitter_name: None,
            submitter_email: None,
            submitter_address: None,
            submitter_country: None,
            submitted_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            accepted_at: None,
            published_at: None,
            authors: vec![],
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn only_listed_edges_are_allowed() {
        use ArticleStatus::*;
        let allowed = [
            (Pending, UnderReview),
            (Pending, Accepted),
            (Pending, Rejected),
            (UnderReview, Accepted),
            (UnderReview, Rejected),
            (Accepted, Published),
        ];

        for from in ArticleStatus::ALL {
            for to in ArticleStatus::ALL {
                if from == to {
                    continue;
                }
                let result = plan_transition(
                    &article(from),
                    to,
                    None,
                    &IssueAssignment::default(),
                    now(),
                );
                if allowed.contains(&(from, to)) {
                    assert!(result.is_ok(), "{} -> {} should be allowed", from, to);
                } else {
                    assert!(
                        matches!(result, Err(AppError::InvalidTransition { from: f, to: t }) if f == from && t == to),
                        "{} -> {} should be rejected",
                        from,
                        to
                    );
                }
            }
        }
    }

    #[test]
    fn same_status_is_a_no_op() {
        for status in ArticleStatus::ALL {
            let plan = plan_transition(
                &article(status),
                status,
                None,
                &IssueAssignment::default(),
                now(),
            )
            .unwrap();
            assert_eq!(plan, TransitionPlan::Unchanged);
        }
    }

    #[test]
    fn rejected_is_terminal() {
        assert!(ArticleStatus::Rejected.is_terminal());
        assert!(ArticleStatus::Published.is_terminal());
        assert!(!ArticleStatus::Accepted.is_terminal());
    }

    #[test]
    fn accepting_sets_accepted_at_once() {
        let plan = plan_transition(
            &article(ArticleStatus::UnderReview),
            ArticleStatus::Accepted,
            None,
            &IssueAssignment::default(),
            now(),
        )
        .unwrap();
        let TransitionPlan::Apply(change) = plan else {
            panic!("expected a change");
        };
        assert_eq!(change.accepted_at, Some(now()));
        assert_eq!(change.published_at, None);

        let mut already = article(ArticleStatus::Pending);
        already.accepted_at = Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());
        let TransitionPlan::Apply(change) = plan_transition(
            &already,
            ArticleStatus::Accepted,
            None,
            &IssueAssignment::default(),
            now(),
        )
        .unwrap() else {
            panic!("expected a change");
        };
        assert_eq!(change.accepted_at, None);
    }

    #[test]
    fn publishing_carries_issue_placement() {
        let issue = IssueAssignment {
            volume_no: Some("5".to_string()),
            issue_no: Some("2".to_string()),
            issue_month: None,
            year: Some("2024".to_string()),
        };
        let TransitionPlan::Apply(change) = plan_transition(
            &article(ArticleStatus::Accepted),
            ArticleStatus::Published,
            None,
            &issue,
            now(),
        )
        .unwrap() else {
            panic!("expected a change");
        };
        assert_eq!(change.published_at, Some(now()));
        assert_eq!(change.issue, Some(issue));
    }

    #[test]
    fn publishing_without_placement_is_allowed() {
        let TransitionPlan::Apply(change) = plan_transition(
            &article(ArticleStatus::Accepted),
            ArticleStatus::Published,
            None,
            &IssueAssignment::default(),
            now(),
        )
        .unwrap() else {
            panic!("expected a change");
        };
        assert_eq!(change.issue, None);
    }

    #[test]
    fn partial_placement_is_rejected() {
        let issue = IssueAssignment {
            volume_no: Some("5".to_string()),
            ..Default::default()
        };
        let result = plan_transition(
            &article(ArticleStatus::Accepted),
            ArticleStatus::Published,
            None,
            &issue,
            now(),
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn placement_outside_publishing_is_rejected() {
        let issue = IssueAssignment {
            issue_month: Some("March".to_string()),
            ..Default::default()
        };
        let result = plan_transition(
            &article(ArticleStatus::Pending),
            ArticleStatus::UnderReview,
            None,
            &issue,
            now(),
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn stale_expected_status_is_a_conflict() {
        let result = plan_transition(
            &article(ArticleStatus::UnderReview),
            ArticleStatus::Rejected,
            Some(ArticleStatus::Pending),
            &IssueAssignment::default(),
            now(),
        );
        match result {
            Err(AppError::Conflict(msg)) => assert!(msg.contains("UNDER_REVIEW")),
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn stale_view_wins_over_edge_check() {
        // The article was accepted by someone else; the caller still thinks PENDING.
        let result = plan_transition(
            &article(ArticleStatus::Accepted),
            ArticleStatus::Rejected,
            Some(ArticleStatus::Pending),
            &IssueAssignment::default(),
            now(),
        );
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let result = plan_transition(
            &article(ArticleStatus::Accepted),
            ArticleStatus::Rejected,
            None,
            &IssueAssignment::default(),
            now(),
        );
        assert!(matches!(result, Err(AppError::InvalidTransition { .. })));
    }

    #[test]
    fn seeded_articles_get_matching_timestamps() {
        assert_eq!(
            initial_timestamps(ArticleStatus::Published, now()),
            (None, Some(now()))
        );
        assert_eq!(initial_timestamps(ArticleStatus::Pending, now()), (None, None));
    }
}
