use tracing::trace;

use crate::types::*;

pub(crate) type UpdateCallback = Box<dyn Fn(ZoneIndex, &ZoneState) + Send + Sync>;
pub(crate) type AvailabilityCallback = Box<dyn Fn(Availability) + Send + Sync>;

/// Host-side hooks shared by the poll and command paths.
#[derive(Default)]
pub(crate) struct Callbacks {
    pub update: Vec<UpdateCallback>,
    pub availability: Vec<AvailabilityCallback>,
}

impl Callbacks {
    pub fn zone_updated(&self, index: ZoneIndex, state: &ZoneState) {
        trace!(zone = index, "notifying zone update");
        for cb in &self.update {
            cb(index, state);
        }
    }

    pub fn availability_changed(&self, availability: Availability) {
        for cb in &self.availability {
            cb(availability);
        }
    }
}
