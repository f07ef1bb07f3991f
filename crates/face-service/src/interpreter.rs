//! Turns a raw search reply into the per-cycle match set.

use crate::error::SearchError;
use crate::search::SearchResponse;
use common::faces::FaceMatch;

/// Label used when an enrolled face was indexed without an external image id
pub const UNKNOWN_FACE_LABEL: &str = "unknown";

/// Error texts the service uses when the frame contains no face at all.
///
/// Matching on error wording is fragile: the phrases are not a stable API and may
/// change with service versions or locales. Keep every use behind
/// [`is_no_faces_error`].
pub const NO_FACES_PHRASES: &[&str] = &["there are no faces in the image", "no faces in the image"];

/// Whether a failure message means "no faces present" rather than a real fault
pub fn is_no_faces_error(message: &str) -> bool {
    let message = message.to_lowercase();
    NO_FACES_PHRASES.iter().any(|phrase| message.contains(phrase))
}

/// Classified result of one search call
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Matches at or above the threshold, in service order (possibly empty)
    Matches(Vec<FaceMatch>),
    /// The service found no face in the frame
    NoFaces,
    /// Any other failure
    Failed(SearchError),
}

/// Filter the reply against the threshold, keeping service order and duplicates
pub fn interpret(reply: Result<SearchResponse, SearchError>, similarity_threshold: f64) -> SearchOutcome {
    match reply {
        Ok(response) => SearchOutcome::Matches(
            response
                .face_matches
                .into_iter()
                .filter(|m| m.similarity >= similarity_threshold)
                .map(|m| {
                    FaceMatch::new(
                        m.external_image_id
                            .unwrap_or_else(|| UNKNOWN_FACE_LABEL.to_string()),
                        m.face_id,
                        m.similarity,
                        m.bounding_box,
                    )
                })
                .collect(),
        ),
        Err(err) if is_no_faces_error(&err.message) => SearchOutcome::NoFaces,
        Err(err) => SearchOutcome::Failed(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchMatch;
    use common::faces::{BoundingBox, SearchErrorKind};

    fn reply(matches: Vec<SearchMatch>) -> Result<SearchResponse, SearchError> {
        Ok(SearchResponse {
            face_matches: matches,
        })
    }

    #[test]
    fn test_no_faces_predicate() {
        assert!(is_no_faces_error(
            "InvalidParameterException: There are no faces in the image. Should be at least 1."
        ));
        assert!(is_no_faces_error("NO FACES IN THE IMAGE"));
        assert!(!is_no_faces_error("AccessDeniedException: not authorized"));
        assert!(!is_no_faces_error("no face detected"));
    }

    #[test]
    fn test_matches_keep_order_and_round() {
        let outcome = interpret(
            reply(vec![
                SearchMatch::new(Some("bob"), 91.0),
                SearchMatch::new(Some("alice"), 95.2049)
                    .with_face_id("face-a")
                    .with_bounding_box(BoundingBox::new(0.1, 0.1, 0.2, 0.2)),
            ]),
            90.0,
        );

        let SearchOutcome::Matches(matches) = outcome else {
            panic!("expected matches");
        };
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].external_image_id, "bob");
        assert_eq!(matches[1].external_image_id, "alice");
        assert_eq!(matches[1].similarity, 95.2);
        assert_eq!(matches[1].face_id.as_deref(), Some("face-a"));
        assert!(matches[1].bounding_box.is_some());
    }

    #[test]
    fn test_threshold_filter_is_inclusive() {
        let outcome = interpret(
            reply(vec![
                SearchMatch::new(Some("exact"), 90.0),
                SearchMatch::new(Some("below"), 89.99),
            ]),
            90.0,
        );
        let SearchOutcome::Matches(matches) = outcome else {
            panic!("expected matches");
        };
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].external_image_id, "exact");
    }

    #[test]
    fn test_duplicates_pass_through() {
        let outcome = interpret(
            reply(vec![
                SearchMatch::new(Some("alice"), 99.0),
                SearchMatch::new(Some("alice"), 98.0),
            ]),
            90.0,
        );
        let SearchOutcome::Matches(matches) = outcome else {
            panic!("expected matches");
        };
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn test_missing_external_id_is_unknown() {
        let outcome = interpret(reply(vec![SearchMatch::new(None, 93.0)]), 90.0);
        let SearchOutcome::Matches(matches) = outcome else {
            panic!("expected matches");
        };
        assert_eq!(matches[0].external_image_id, UNKNOWN_FACE_LABEL);
    }

    #[test]
    fn test_failure_classification() {
        let soft = interpret(
            Err(SearchError::new(
                SearchErrorKind::InvalidParameter,
                "There are no faces in the image. Should be at least 1.",
            )),
            90.0,
        );
        assert_eq!(soft, SearchOutcome::NoFaces);

        let hard = interpret(
            Err(SearchError::new(SearchErrorKind::AccessDenied, "not authorized")),
            90.0,
        );
        match hard {
            SearchOutcome::Failed(err) => assert_eq!(err.kind, SearchErrorKind::AccessDenied),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
