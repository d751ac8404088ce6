pub mod access;
pub mod connectivity;
pub mod data_access;
pub mod domain;
pub mod memory;
pub mod ports;
pub mod session;

pub use access::{authorize, Access};
pub use connectivity::{BannerState, ConnectivityBanner, ConnectivityMonitor, NetworkEvent, OfflineNotice};
pub use data_access::{classify_error, DataAccessFacade, FacadeStatus, FetchOutcome};
pub use domain::{AuthUser, Document, Fields, FetchError, FilterOp, Principal, QueryCondition, Role, UserProfile};
pub use ports::{AuthError, DocumentStore, IdentityProvider, PortError, PortResult};
pub use session::{SessionManager, SessionSnapshot};
