//! # Códigos de Estado HTTP
//!
//! Códigos que produce el servidor:
//!
//! - **2xx**: Éxito (200 OK, archivo servido)
//! - **4xx**: Error del cliente (400 request malformado, 403 sin permiso de
//!   lectura, 404 archivo inexistente)
//! - **5xx**: Error del servidor (500 request incompleto / interno, 503 tabla
//!   de conexiones llena)

/// Representa los códigos de estado HTTP que soporta nuestro servidor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// 200 OK - El archivo pedido se sirvió
    Ok = 200,

    /// 400 Bad Request - Request line/headers malformados, versión incorrecta
    /// o el target es un directorio
    BadRequest = 400,

    /// 403 Forbidden - El archivo existe pero no es legible por "otros"
    Forbidden = 403,

    /// 404 Not Found - `stat` falló sobre la ruta pedida
    NotFound = 404,

    /// 500 Internal Server Error - Fallback para requests incompletos
    InternalServerError = 500,

    /// 503 Service Unavailable - La tabla de conexiones está llena
    ServiceUnavailable = 503,
}

impl StatusCode {
    /// Convierte el código a su valor numérico
    ///
    /// # Ejemplo
    /// ```
    /// use reactor_http::http::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// ```
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Retorna el texto de razón (reason phrase) asociado al código
    ///
    /// # Ejemplo
    /// ```
    /// use reactor_http::http::StatusCode;
    /// assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    /// assert_eq!(StatusCode::NotFound.reason_phrase(), "Not Found");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }

    /// Body fijo que acompaña a las respuestas de error
    ///
    /// Las respuestas 200 no tienen body fijo: llevan el archivo mapeado.
    pub fn error_body(&self) -> &'static str {
        match self {
            StatusCode::Ok => "",
            StatusCode::BadRequest => {
                "Your request has bad syntax or is inherently impossible to satisfy.\n"
            }
            StatusCode::Forbidden => "You do not have permission to get file from this server.\n",
            StatusCode::NotFound => "The requested file was not found on this server.\n",
            StatusCode::InternalServerError => {
                "There was an unusual problem serving the requested file.\n"
            }
            StatusCode::ServiceUnavailable => "Server busy!\n",
        }
    }
}

impl std::fmt::Display for StatusCode {
    /// Formato: "200 OK"
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}
