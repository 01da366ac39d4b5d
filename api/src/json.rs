use axum::extract::{FromRequest, Request, rejection::JsonRejection};

use crate::error::AppError;

// We define our own `Json` extractor so body rejections come back as a 400
// with the service's `detail` error shape instead of axum's default.
pub struct Json<T>(pub T);

impl<S, T> FromRequest<S> for Json<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(value) => Ok(Self(value.0)),
            Err(rejection) => Err(AppError::BadRequest(rejection.body_text())),
        }
    }
}
