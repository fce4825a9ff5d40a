use thiserror::Error;

/// Everything a handler can run into. All variants are recovered at the
/// handler boundary and turned into a user-visible message; none of them
/// abort the dispatcher.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("error de red: {0}")]
    Http(#[from] reqwest::Error),

    #[error("respuesta {status} al pedir {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    /// A search that matched nothing. Distinct from a failed fetch: the
    /// page loaded fine, it just had the "no matches" marker.
    #[error("sin resultados")]
    NoResults,

    /// Navigation past the first or last page. The paginator enforces
    /// this itself so the controller cannot walk out of range.
    #[error("ya en el límite de páginas")]
    AtBoundary,

    /// Callback for a session key with no stored state (server restarted,
    /// or the browser was already closed).
    #[error("sesión de búsqueda caducada")]
    StaleSession,

    /// Selector token that does not resolve inside the stored list.
    #[error("botón inválido")]
    InvalidToken,

    /// Watch-list position outside 1..=len.
    #[error("la posición {0} no existe")]
    BadPosition(usize),

    /// Removing the tail of a watch-list that has no entries.
    #[error("la lista está vacía")]
    EmptyList,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
