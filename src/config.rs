#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Keys the confirmation-code MAC. Independent from the JWT secret so
    /// rotating one credential type does not invalidate the other.
    pub secret_key: String,
    pub jwt_secret: String,
    pub jwt_maxage: i64,
    pub port: u16,
    pub frontend_url: String,
}

impl Config {

    pub fn init() -> Config {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let secret_key = std::env::var("SECRET_KEY").expect("SECRET_KEY must be set");
        let jwt_secret = std::env::var("JWT_SECRET_KEY").expect("JWT_SECRET_KEY must be set");
        let jwt_maxage = std::env::var("JWT_MAXAGE").expect("JWT_MAXAGE must be set");
        let frontend_url = std::env::var("FRONTEND_URL").expect("FRONTEND_URL must be set");

        Config {
            database_url,
            secret_key,
            jwt_secret,
            jwt_maxage: jwt_maxage.parse::<i64>().unwrap(),
            port: 8000,
            frontend_url,
        }
    }

}
