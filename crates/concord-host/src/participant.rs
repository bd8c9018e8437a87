//! One mounted application: bus client, dispatcher and router wired together.

use crate::bus::{Bus, BusClient};
use crate::document::HostDocument;
use crate::router::{NavigationError, Router};
use concord_core::{
    CoordinationConfig, GuardDispatcher, NavigateOptions, NavigationOutcome, Navigator,
    ProtocolError, RouteConfig, instrument_routes,
};
use std::sync::Arc;

pub struct Participant {
    name: String,
    document: Arc<HostDocument>,
    router: Arc<Router>,
    dispatcher: Arc<GuardDispatcher>,
    client: Arc<BusClient>,
}

impl Participant {
    /// Join the bus, activate coordination, instrument `routes`, and mount.
    pub fn mount(
        name: impl Into<String>,
        document: &Arc<HostDocument>,
        bus: &Arc<Bus>,
        routes: Vec<RouteConfig>,
        config: CoordinationConfig,
    ) -> Result<Self, ProtocolError> {
        let name = name.into();
        let client = bus.join(name.clone());
        let dispatcher = GuardDispatcher::new(name.clone(), config);
        let router = Router::new(name.clone(), document.clone());

        let navigator: Arc<dyn Navigator> = router.clone();
        dispatcher.activate(client.clone(), Arc::downgrade(&navigator))?;
        router.reset_config(instrument_routes(&dispatcher, routes)?);
        document.mount(&router);

        Ok(Self {
            name,
            document: document.clone(),
            router,
            dispatcher,
            client,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn dispatcher(&self) -> &Arc<GuardDispatcher> {
        &self.dispatcher
    }

    pub fn client(&self) -> &Arc<BusClient> {
        &self.client
    }

    /// A user-initiated navigation in this application.
    pub async fn navigate(&self, url: &str) -> Result<NavigationOutcome, NavigationError> {
        self.router.navigate(url, NavigateOptions::default()).await
    }

    /// Leave the page: stop answering rounds and stop following navigations.
    pub fn unmount(self) -> Result<(), ProtocolError> {
        self.dispatcher.teardown()?;
        self.client.leave();
        self.document.unmount(&self.name);
        Ok(())
    }
}
