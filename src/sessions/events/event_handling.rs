use crate::sessions::session::SessionStatus;

pub(crate) type StatusListener = dyn for<'a> Fn(&'a SessionStatus) + Send + 'static;
pub(crate) type RemoteListener = dyn Fn(u32) + Send + 'static;

pub struct EventListeners {
    status_changed: Vec<Box<StatusListener>>,
    remote_joined: Vec<Box<RemoteListener>>,
    remote_left: Vec<Box<RemoteListener>>,
}

pub struct StatusChangedEvent;
pub struct RemoteJoinedEvent;
pub struct RemoteLeftEvent;

pub trait EventType {
    type Data<'a>;

    fn add_listener_to_storage<F>(listeners: &mut EventListeners, callback: F)
    where
        F: for<'a> Fn(Self::Data<'a>) + Send + 'static;
}

impl EventType for StatusChangedEvent {
    type Data<'a> = &'a SessionStatus;

    fn add_listener_to_storage<F>(listeners: &mut EventListeners, callback: F)
    where
        F: for<'a> Fn(Self::Data<'a>) + Send + 'static,
    {
        listeners.status_changed.push(Box::new(callback));
    }
}

impl EventType for RemoteJoinedEvent {
    type Data<'a> = u32;

    fn add_listener_to_storage<F>(listeners: &mut EventListeners, callback: F)
    where
        F: for<'a> Fn(Self::Data<'a>) + Send + 'static,
    {
        listeners.remote_joined.push(Box::new(callback));
    }
}

impl EventType for RemoteLeftEvent {
    type Data<'a> = u32;

    fn add_listener_to_storage<F>(listeners: &mut EventListeners, callback: F)
    where
        F: for<'a> Fn(Self::Data<'a>) + Send + 'static,
    {
        listeners.remote_left.push(Box::new(callback));
    }
}

impl Default for EventListeners {
    fn default() -> Self {
        Self::new()
    }
}

impl EventListeners {
    pub fn new() -> Self {
        Self {
            status_changed: Vec::new(),
            remote_joined: Vec::new(),
            remote_left: Vec::new(),
        }
    }

    pub fn notify_status_changed(&self, status: &SessionStatus) {
        for listener in &self.status_changed {
            listener(status);
        }
    }

    pub fn notify_remote_joined(&self, uid: u32) {
        for listener in &self.remote_joined {
            listener(uid);
        }
    }

    pub fn notify_remote_left(&self, uid: u32) {
        for listener in &self.remote_left {
            listener(uid);
        }
    }
}
