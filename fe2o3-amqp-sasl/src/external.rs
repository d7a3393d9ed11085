//! SASL EXTERNAL (RFC 4422 Appendix A)

use bytes::Bytes;

use crate::{
    error::MechanismError, identity::AuthenticatedIdentity, mechanism::MechanismInstance,
    session::ChannelSecurity,
};

/// Relies on the transport having authenticated the client certificate.
///
/// No identity is produced, mapping the certificate subject to a principal is left to the
/// transport.
#[derive(Debug)]
pub struct ExternalAuthenticator {
    channel: ChannelSecurity,
    complete: bool,
}

impl ExternalAuthenticator {
    pub(crate) fn new(channel: ChannelSecurity) -> Self {
        Self {
            channel,
            complete: false,
        }
    }
}

impl MechanismInstance for ExternalAuthenticator {
    fn process_response(&mut self, response: &[u8]) -> Result<Option<Bytes>, MechanismError> {
        if self.complete && !response.is_empty() {
            return Err(MechanismError::IllegalState("complete"));
        }
        // The initial response only carries an optional authzid
        self.complete = true;
        Ok(None)
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn is_authenticated(&self) -> bool {
        self.complete && self.channel.is_mutually_authenticated()
    }

    fn authenticated_identity(&self) -> Option<&AuthenticatedIdentity> {
        None
    }
}
