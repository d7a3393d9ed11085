//! SASL PLAIN (RFC 4616)

use bytes::Bytes;

use crate::{
    error::MechanismError,
    identity::AuthenticatedIdentity,
    mechanism::{MechanismContext, MechanismInstance},
    store::with_transaction,
};

#[derive(Debug)]
enum PlainAuthenticatorState {
    Initial,
    Complete {
        identity: Option<AuthenticatedIdentity>,
    },
    Failed(MechanismError),
}

/// Server side of a PLAIN exchange
#[derive(Debug)]
pub struct PlainAuthenticator {
    context: MechanismContext,
    state: PlainAuthenticatorState,
}

/// authzid, authcid and password of a PLAIN response
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct PlainResponse<'a> {
    pub authzid: &'a str,
    pub authcid: &'a str,
    pub password: &'a str,
}

fn find_null_position(response: &[u8], start: usize) -> Option<usize> {
    response
        .get(start..)?
        .iter()
        .position(|b| *b == 0)
        .map(|position| position + start)
}

/// Splits `authzid NUL authcid NUL password`. The password is everything after the second NUL.
pub(crate) fn parse_plain_response(response: &[u8]) -> Result<PlainResponse<'_>, MechanismError> {
    let authzid_end =
        find_null_position(response, 0).ok_or(MechanismError::AuthzidTerminatorNotFound)?;
    let authcid_end = find_null_position(response, authzid_end + 1)
        .ok_or(MechanismError::AuthcidTerminatorNotFound)?;

    Ok(PlainResponse {
        authzid: std::str::from_utf8(&response[..authzid_end])?,
        authcid: std::str::from_utf8(&response[authzid_end + 1..authcid_end])?,
        password: std::str::from_utf8(&response[authcid_end + 1..])?,
    })
}

impl PlainAuthenticator {
    pub(crate) fn new(context: MechanismContext) -> Self {
        Self {
            context,
            state: PlainAuthenticatorState::Initial,
        }
    }

    fn verify(&self, response: &[u8]) -> Result<Option<AuthenticatedIdentity>, MechanismError> {
        let PlainResponse {
            authcid, password, ..
        } = parse_plain_response(response)?;

        let realm = &self.context.realm;
        let identity = with_transaction(self.context.store.as_ref(), |txn| {
            let user = match txn.find_user(realm, authcid)? {
                Some(user) => user,
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(realm = %realm, "User not found");
                    #[cfg(feature = "log")]
                    log::debug!("User not found in realm {}", realm);
                    return Ok(None);
                }
            };

            let is_valid = txn.verify_password(realm, &user, password)?
                && txn.is_username_match(authcid, user.identity.username());
            if !is_valid {
                #[cfg(feature = "tracing")]
                tracing::debug!(realm = %realm, "Invalid password");
                #[cfg(feature = "log")]
                log::debug!("Invalid password for user in realm {}", realm);
                return Ok(None);
            }

            Ok(Some(user.identity))
        })?;

        Ok(identity)
    }
}

impl MechanismInstance for PlainAuthenticator {
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn process_response(&mut self, response: &[u8]) -> Result<Option<Bytes>, MechanismError> {
        match &self.state {
            PlainAuthenticatorState::Initial => match self.verify(response) {
                Ok(identity) => {
                    self.state = PlainAuthenticatorState::Complete { identity };
                    Ok(None)
                }
                Err(error) => {
                    self.state = PlainAuthenticatorState::Failed(error.clone());
                    Err(error)
                }
            },
            PlainAuthenticatorState::Complete { .. } => {
                if response.is_empty() {
                    Ok(None)
                } else {
                    Err(MechanismError::IllegalState("complete"))
                }
            }
            PlainAuthenticatorState::Failed(error) => Err(error.clone()),
        }
    }

    fn is_complete(&self) -> bool {
        !matches!(self.state, PlainAuthenticatorState::Initial)
    }

    fn is_authenticated(&self) -> bool {
        matches!(
            self.state,
            PlainAuthenticatorState::Complete {
                identity: Some(_)
            }
        )
    }

    fn authenticated_identity(&self) -> Option<&AuthenticatedIdentity> {
        match &self.state {
            PlainAuthenticatorState::Complete { identity } => identity.as_ref(),
            _ => None,
        }
    }
}
