//! Participant deep link and the QR image URL that encodes it.

use reqwest::Url;

use crate::errors::ServiceError;

/// External QR rendering service; only the URL is built here.
pub const QR_SERVICE_URL: &str = "https://api.qrserver.com/v1/create-qr-code/";
pub const QR_SIZE: &str = "300x300";

/// `<board_url>?mode=participant&session=<id>&q=<question>`, where
/// `board_url` is the origin and path the board is served from.
pub fn participant_link(board_url: &str, session_id: &str, question: &str) -> Result<Url, ServiceError> {
    let mut url = Url::parse(board_url)
        .map_err(|e| ServiceError::Validation(format!("invalid board url `{board_url}`: {e}")))?;
    url.set_query(None);
    url.set_fragment(None);
    url.query_pairs_mut()
        .append_pair("mode", "participant")
        .append_pair("session", session_id)
        .append_pair("q", question);
    Ok(url)
}

pub fn qr_code_url(link: &Url) -> Url {
    let mut url = Url::parse(QR_SERVICE_URL).expect("static QR service url");
    url.query_pairs_mut()
        .append_pair("size", QR_SIZE)
        .append_pair("data", link.as_str());
    url
}
