use std::sync::Arc;

use crate::{
    config::Config,
    db::{
        ClientStore, DbPool, DocumentStore, InvoiceStore, NotificationStore, QuotationStore,
        UserStore,
    },
    services::{AuthService, NotificationService, ReportService},
    ws::{ConnectionManager, DefaultMessageRouter, MessageRouter, SharedConnectionManager},
};

/// Shared application state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: UserStore,
    pub clients: ClientStore,
    pub quotations: QuotationStore,
    pub invoices: InvoiceStore,
    pub documents: DocumentStore,
    pub notifications: NotificationStore,
    pub auth: AuthService,
    pub notifier: NotificationService,
    pub reports: ReportService,
    pub connection_manager: SharedConnectionManager,
    pub message_router: Arc<dyn MessageRouter>,
}

impl AppState {
    pub fn new(config: Config, pool: DbPool) -> Self {
        let users = UserStore::new(pool.clone());
        let clients = ClientStore::new(pool.clone());
        let quotations = QuotationStore::new(pool.clone());
        let invoices = InvoiceStore::new(pool.clone());
        let documents = DocumentStore::new(pool.clone());
        let notifications = NotificationStore::new(pool);

        let auth = AuthService::new(&config.jwt_secret, config.jwt_expiration_hours);
        let connection_manager = Arc::new(ConnectionManager::new());
        let message_router = Arc::new(DefaultMessageRouter::new(users.clone(), auth.clone()));
        let notifier = NotificationService::new(
            notifications.clone(),
            quotations.clone(),
            invoices.clone(),
            connection_manager.clone(),
        );
        let reports = ReportService::new(quotations.clone(), invoices.clone());

        Self {
            config: Arc::new(config),
            users,
            clients,
            quotations,
            invoices,
            documents,
            notifications,
            auth,
            notifier,
            reports,
            connection_manager,
            message_router,
        }
    }
}
