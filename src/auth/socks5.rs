use crate::{
    auth::store::CredentialStore,
    common::error::ProxyError,
    proto::socks5::{
        subnego::{UserPassRequest, UserPassResponse},
        AuthMethod,
    },
};
use anyhow::{bail, Result};
use std::{collections::HashSet, sync::Arc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// The authentication sub-protocol selected during SOCKS5 method negotiation
/// (spec.md §4.G). `NoAuth` requires nothing past the handshake; `UserPass`
/// runs the RFC 1929 exchange and checks the result against a credential
/// store.
pub enum Authenticator {
    NoAuth,
    UserPass(Arc<dyn CredentialStore>),
}

impl Authenticator {
    pub fn method(&self) -> AuthMethod {
        match self {
            Authenticator::NoAuth => AuthMethod::NoAuth,
            Authenticator::UserPass(_) => AuthMethod::UserPass,
        }
    }

    pub async fn authenticate<T: AsyncReadExt + AsyncWriteExt + Unpin + Send>(&self, stream: &mut T) -> Result<()> {
        match self {
            Authenticator::NoAuth => Ok(()),
            Authenticator::UserPass(store) => {
                let request = UserPassRequest::read_from(stream).await?;
                if store.valid(&request.username, &request.password).await {
                    UserPassResponse::success().write_to(stream).await?;
                    Ok(())
                } else {
                    UserPassResponse::failure().write_to(stream).await?;
                    bail!(ProxyError::AuthFailure(Some(request.username)));
                }
            }
        }
    }
}

/// Picks the authenticator the core will run for a connection, given the
/// methods a client offered in its handshake. The server only ever supports
/// one method at a time: `UserPass` when a credential store is configured,
/// `NoAuth` otherwise. A client that doesn't offer the supported method gets
/// no match, which the handler turns into `HandshakeResponse::no_acceptable_method`.
pub fn select_authenticator(offered: &HashSet<AuthMethod>, credential_store: Option<&Arc<dyn CredentialStore>>) -> Option<Authenticator> {
    match credential_store {
        Some(store) => offered.contains(&AuthMethod::UserPass).then(|| Authenticator::UserPass(store.clone())),
        None => offered.contains(&AuthMethod::NoAuth).then_some(Authenticator::NoAuth),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::{MockCredentialStore, StaticCredentialStore};

    #[test]
    fn selects_user_pass_when_store_configured_and_offered() {
        let store: Arc<dyn CredentialStore> = Arc::new(StaticCredentialStore::new());
        let offered = HashSet::from([AuthMethod::NoAuth, AuthMethod::UserPass]);
        let auth = select_authenticator(&offered, Some(&store)).unwrap();
        assert_eq!(AuthMethod::UserPass, auth.method());
    }

    #[test]
    fn no_match_when_store_configured_but_not_offered() {
        let store: Arc<dyn CredentialStore> = Arc::new(StaticCredentialStore::new());
        let offered = HashSet::from([AuthMethod::NoAuth]);
        assert!(select_authenticator(&offered, Some(&store)).is_none());
    }

    #[test]
    fn selects_no_auth_when_store_absent() {
        let offered = HashSet::from([AuthMethod::NoAuth, AuthMethod::UserPass]);
        let auth = select_authenticator(&offered, None).unwrap();
        assert_eq!(AuthMethod::NoAuth, auth.method());
    }

    #[tokio::test]
    async fn user_pass_rejects_bad_credentials() {
        let store = StaticCredentialStore::new();
        store.add("alice", "secret").await.unwrap();
        let auth = Authenticator::UserPass(Arc::new(store));

        let request: Vec<u8> = vec![0x01, 5, b'a', b'l', b'i', b'c', b'e', 5, b'w', b'r', b'o', b'n', b'g'];
        let mut stream = tokio_test::io::Builder::new().read(&request).write(&[0x01, 0x01]).build();
        let err = auth.authenticate(&mut stream).await.unwrap_err();
        assert!(err.downcast_ref::<ProxyError>().is_some());
    }

    #[tokio::test]
    async fn user_pass_accepts_whatever_the_store_accepts() {
        let mut mock = MockCredentialStore::new();
        mock.expect_valid().withf(|user, pass| user == "alice" && pass == "secret").return_once(|_, _| true);
        let auth = Authenticator::UserPass(Arc::new(mock));

        let request: Vec<u8> = vec![0x01, 5, b'a', b'l', b'i', b'c', b'e', 6, b's', b'e', b'c', b'r', b'e', b't'];
        let mut stream = tokio_test::io::Builder::new().read(&request).write(&[0x01, 0x00]).build();
        auth.authenticate(&mut stream).await.unwrap();
    }
}
