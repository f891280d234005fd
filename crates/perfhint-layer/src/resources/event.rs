use ash::vk;
use perfhint_analysis::event::EventState;

pub struct Event {
    handle: vk::Event,
    pub(crate) state: EventState,
}

impl Event {
    pub fn new(handle: vk::Event) -> Self {
        Self {
            handle,
            state: EventState::new(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::Event {
        self.handle
    }

    #[inline]
    pub fn state(&self) -> &EventState {
        &self.state
    }
}
