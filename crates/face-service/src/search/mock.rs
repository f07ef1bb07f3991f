use super::{FaceSearchClient, SearchRequest, SearchResponse};
use crate::error::SearchError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Scripted face search for local development and tests.
///
/// Queued replies are consumed in order; once the queue is empty every call
/// gets the fallback reply (an empty match list unless set otherwise).
pub struct MockSearchClient {
    replies: Mutex<VecDeque<Result<SearchResponse, SearchError>>>,
    fallback: Mutex<Result<SearchResponse, SearchError>>,
    calls: AtomicUsize,
    last_request: Mutex<Option<SearchRequest>>,
}

impl MockSearchClient {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(SearchResponse::default())),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Answer every call with the same response
    pub fn with_response(response: SearchResponse) -> Self {
        let client = Self::new();
        client.set_fallback(Ok(response));
        client
    }

    /// Fail every call with the same error
    pub fn with_error(error: SearchError) -> Self {
        let client = Self::new();
        client.set_fallback(Err(error));
        client
    }

    pub fn push_reply(&self, reply: Result<SearchResponse, SearchError>) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
    }

    pub fn set_fallback(&self, reply: Result<SearchResponse, SearchError>) {
        *self.fallback.lock().unwrap_or_else(|e| e.into_inner()) = reply;
    }

    /// Number of searches performed so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<SearchRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for MockSearchClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FaceSearchClient for MockSearchClient {
    fn provider(&self) -> &'static str {
        "mock"
    }

    async fn search_faces_by_image(
        &self,
        request: &SearchRequest,
    ) -> Result<SearchResponse, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) = Some(request.clone());

        let queued = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match queued {
            Some(reply) => reply,
            None => self
                .fallback
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchMatch;
    use common::faces::SearchErrorKind;

    fn request() -> SearchRequest {
        SearchRequest {
            collection_id: "home_faces".to_string(),
            image: vec![0xff, 0xd8],
            similarity_threshold: 90.0,
            max_faces: 3,
        }
    }

    #[tokio::test]
    async fn test_queued_replies_then_fallback() {
        let client = MockSearchClient::new();
        client.push_reply(Ok(SearchResponse {
            face_matches: vec![SearchMatch::new(Some("alice"), 97.0)],
        }));
        client.push_reply(Err(SearchError::new(SearchErrorKind::Throttled, "slow down")));

        let first = client.search_faces_by_image(&request()).await.unwrap();
        assert_eq!(first.face_matches.len(), 1);

        let second = client.search_faces_by_image(&request()).await.unwrap_err();
        assert_eq!(second.kind, SearchErrorKind::Throttled);

        let third = client.search_faces_by_image(&request()).await.unwrap();
        assert!(third.face_matches.is_empty());

        assert_eq!(client.calls(), 3);
        assert_eq!(client.last_request().unwrap().collection_id, "home_faces");
    }
}
