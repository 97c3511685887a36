//! Mapping provider errors onto the user-facing failure taxonomy.

use stylecanvas_core::preview::{PreviewErrorKind, PreviewFailure};
use stylecanvas_provider::ProviderError;

/// Classify a provider error.
///
/// Returns `None` for [`ProviderError::Aborted`]: a cancelled request is
/// not a failure and must not surface an error.
pub fn classify(err: &ProviderError) -> Option<PreviewFailure> {
    let failure = match err {
        ProviderError::Aborted => return None,
        ProviderError::TimedOut(_) => {
            PreviewFailure::transient("Preview generation took too long. Please try again")
        }
        ProviderError::Request(_) => PreviewFailure::transient(
            "Network error while generating your preview. Check your connection and try again",
        ),
        ProviderError::Decode(_) => {
            PreviewFailure::transient("Unexpected response from the preview service. Please try again")
        }
        ProviderError::Api { status, .. } => classify_status(*status),
    };
    Some(failure)
}

fn classify_status(status: u16) -> PreviewFailure {
    match status {
        401 | 403 => PreviewFailure::new(
            PreviewErrorKind::AuthRequired,
            "Sign in to keep generating previews",
        ),
        402 => PreviewFailure::new(
            PreviewErrorKind::QuotaExceeded,
            "You're out of preview tokens. Upgrade to keep generating",
        ),
        429 => PreviewFailure::new(
            PreviewErrorKind::QuotaExceeded,
            "Too many previews right now. Please wait a moment",
        ),
        400 | 413 | 415 | 422 => PreviewFailure::new(
            PreviewErrorKind::Validation,
            "We couldn't process this photo. Try uploading a different image",
        ),
        _ => PreviewFailure::transient("The preview service is having trouble. Please try again"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn api(status: u16) -> ProviderError {
        ProviderError::Api {
            status,
            body: String::new(),
        }
    }

    fn kind(err: &ProviderError) -> PreviewErrorKind {
        classify(err).expect("not an abort").kind
    }

    #[test]
    fn abort_is_not_a_failure() {
        assert!(classify(&ProviderError::Aborted).is_none());
    }

    #[test]
    fn status_codes_map_to_taxonomy() {
        assert_eq!(kind(&api(401)), PreviewErrorKind::AuthRequired);
        assert_eq!(kind(&api(403)), PreviewErrorKind::AuthRequired);
        assert_eq!(kind(&api(402)), PreviewErrorKind::QuotaExceeded);
        assert_eq!(kind(&api(429)), PreviewErrorKind::QuotaExceeded);
        assert_eq!(kind(&api(422)), PreviewErrorKind::Validation);
        assert_eq!(kind(&api(500)), PreviewErrorKind::Transient);
        assert_eq!(kind(&api(503)), PreviewErrorKind::Transient);
    }

    #[test]
    fn timeouts_and_decode_errors_are_transient() {
        assert!(classify(&ProviderError::TimedOut(Duration::from_secs(1)))
            .is_some_and(|f| f.is_retryable()));
        assert!(classify(&ProviderError::Decode("eof".into())).is_some_and(|f| f.is_retryable()));
    }
}
