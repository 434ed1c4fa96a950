//! Scoped client context

use sheetlabel_mip::{
    ClassificationClient, ComponentScope, MipContext, MipError, MipResult, Profile, ProfileSettings,
};

/// A live client context that is shut down exactly once.
///
/// [`Session::close`] shuts down and reports the result. If the session is
/// dropped without being closed (an early `?` return or a panic), `Drop`
/// shuts down instead and logs any failure.
pub struct Session<'c, C: ClassificationClient> {
    client: &'c mut C,
    context: Option<MipContext>,
}

impl<'c, C: ClassificationClient> Session<'c, C> {
    /// Initialize `client` for `scope`
    pub fn start(client: &'c mut C, scope: ComponentScope) -> MipResult<Self> {
        let context = client.initialize(scope)?;
        tracing::debug!(context = %context.id(), "session started");
        Ok(Self {
            client,
            context: Some(context),
        })
    }

    pub fn client(&mut self) -> &mut C {
        self.client
    }

    /// Load a profile under this session's context
    pub fn load_profile(&mut self, settings: &ProfileSettings) -> MipResult<Profile> {
        let context = self.context.as_ref().ok_or(MipError::NotInitialized)?;
        self.client.load_profile(context, settings)
    }

    /// Shut the context down now
    pub fn close(mut self) -> MipResult<()> {
        match self.context.take() {
            Some(context) => self.client.shutdown(context),
            None => Ok(()),
        }
    }
}

impl<C: ClassificationClient> Drop for Session<'_, C> {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            let id = context.id();
            if let Err(e) = self.client.shutdown(context) {
                tracing::warn!(context = %id, error = %e, "shutdown failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetlabel_mip::{FakeClient, Operation};

    #[test]
    fn test_close_shuts_down_once() {
        let mut client = FakeClient::new(vec![]);
        let session = Session::start(&mut client, ComponentScope::File).unwrap();
        session.close().unwrap();
        assert_eq!(client.shutdown_count(), 1);
    }

    #[test]
    fn test_drop_shuts_down() {
        let mut client = FakeClient::new(vec![]);
        {
            let mut session = Session::start(&mut client, ComponentScope::File).unwrap();
            let profile = session.load_profile(&ProfileSettings::new("mip_data", Default::default()));
            assert!(profile.is_ok());
        }
        assert_eq!(client.shutdown_count(), 1);
        assert_eq!(client.calls().last(), Some(&Operation::Shutdown));
    }

    #[test]
    fn test_failed_start_has_nothing_to_shut_down() {
        let mut client = FakeClient::new(vec![]).failing_on(Operation::Initialize);
        assert!(Session::start(&mut client, ComponentScope::File).is_err());
        assert_eq!(client.shutdown_count(), 0);
    }

    #[test]
    fn test_close_reports_shutdown_failure() {
        let mut client = FakeClient::new(vec![]).failing_on(Operation::Shutdown);
        let session = Session::start(&mut client, ComponentScope::File).unwrap();
        assert!(session.close().is_err());
        assert_eq!(client.shutdown_count(), 1);
    }
}
