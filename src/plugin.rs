use std::{marker::PhantomData, sync::Arc};

use bevy::app::{App, First, Plugin};
use bevy::ecs::{
    schedule::{common_conditions::resource_exists, IntoSystemConfigs},
    system::{ResMut, Resource},
};

use crate::{device::PoolDevice, FrameStatus, PoolConfig, PoolSession};

/// The device a [`PoolPlugin`] builds its session on. Insert before the app finishes.
pub struct SharedDevice<D>(pub Arc<D>);
impl<D: PoolDevice + 'static> Resource for SharedDevice<D> {}
impl<D> Clone for SharedDevice<D> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<D: PoolDevice + 'static> Resource for PoolSession<D> {}

/// Inserts a [`PoolSession`] and opens frames at the start of every update.
///
/// The renderer calls [`PoolSession::end_frame`] after submitting each frame.
pub struct PoolPlugin<D> {
    pub config: PoolConfig,
    _marker: PhantomData<fn() -> D>,
}
impl<D> PoolPlugin<D> {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            _marker: PhantomData,
        }
    }
}
impl<D> Default for PoolPlugin<D> {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl<D: PoolDevice + 'static> Plugin for PoolPlugin<D> {
    fn build(&self, app: &mut App) {
        app.add_systems(
            First,
            begin_frame_system::<D>.run_if(resource_exists::<PoolSession<D>>),
        );
    }
    fn finish(&self, app: &mut App) {
        let Some(device) = app.world().get_resource::<SharedDevice<D>>() else {
            tracing::error!("PoolPlugin requires a SharedDevice resource");
            return;
        };
        match PoolSession::new(device.0.clone(), self.config.clone()) {
            Ok(session) => {
                app.insert_resource(session);
            }
            Err(err) => tracing::error!(%err, "failed to create pool session"),
        }
    }
}

fn begin_frame_system<D: PoolDevice + 'static>(mut session: ResMut<PoolSession<D>>) {
    match session.begin_frame() {
        Ok(FrameStatus::Ready { .. }) => {}
        Ok(FrameStatus::Busy { waiting_on, .. }) => {
            tracing::trace!(?waiting_on, "frame skipped, device busy");
        }
        Err(err) => tracing::error!(%err, "begin_frame failed"),
    }
}
