//! Mail dispatch contract and verification links.

use thiserror::Error;
use url::Url;

use affirm_types::FlowId;

use crate::VerificationError;

pub use affirm_store::MailTemplate;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport error: {0}")]
    Transport(String),

    #[error("message rejected: {0}")]
    Rejected(String),
}

/// Delivers rendered mail. Implemented by the host system.
///
/// The engine treats delivery as fire-and-forget: failures are logged and
/// never retried by the engine itself.
pub trait MailTransport: Send + Sync {
    fn send(&self, template: &MailTemplate) -> Result<(), MailError>;
}

/// Builds verification links under the public base URL.
#[derive(Clone, Debug)]
pub struct LinkBuilder {
    base: Url,
}

impl LinkBuilder {
    pub const PATH: &'static str = "self-service/verification";
    pub const FLOW_PARAM: &'static str = "flow";
    pub const TOKEN_PARAM: &'static str = "token";

    pub fn new(public_url: &str) -> Result<Self, url::ParseError> {
        let mut base = Url::parse(public_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// The link mailed to the address owner.
    pub fn verification_url(&self, flow: &FlowId, token: &str) -> Result<Url, url::ParseError> {
        let mut url = self.base.join(Self::PATH)?;
        url.query_pairs_mut()
            .append_pair(Self::FLOW_PARAM, &flow.to_hex())
            .append_pair(Self::TOKEN_PARAM, token);
        Ok(url)
    }
}

/// Extract the flow id and token from a verification link.
///
/// Every malformed link maps to [`VerificationError::NotFound`], the same
/// answer a well-formed link with a wrong token gets.
pub fn parse_verification_link(link: &str) -> Result<(FlowId, String), VerificationError> {
    let url = Url::parse(link).map_err(|_| VerificationError::NotFound)?;
    let mut flow = None;
    let mut token = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            LinkBuilder::FLOW_PARAM => flow = Some(value.into_owned()),
            LinkBuilder::TOKEN_PARAM => token = Some(value.into_owned()),
            _ => {}
        }
    }
    let flow = flow
        .and_then(|f| FlowId::from_hex(&f).ok())
        .ok_or(VerificationError::NotFound)?;
    let token = token.ok_or(VerificationError::NotFound)?;
    Ok((flow, token))
}
