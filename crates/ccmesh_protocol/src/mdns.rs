//! mDNS discovery constants.
//!
//! Resolving this service name is an external collaborator (see the top-level
//! spec's Non-goals / out-of-scope list): the fabric only names the service so
//! a real discovery client — or the static fallback in `ccmesh_client::locate`
//! — can agree on it.

/// Service name the job server would advertise under, if mDNS discovery were
/// wired up by the deployment.
pub const SERVICE_NAME: &str = "job_server._ccmesh._tcp.local.";
