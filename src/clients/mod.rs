pub mod api;
pub mod models;
pub mod service;

pub use models::{
    Client, ClientRecord, ClientStats, CreateClient, IssuedCredentials, ListClientsQuery,
    UpdateClient,
};
pub use service::ClientAdmin;
