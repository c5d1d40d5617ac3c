use super::sendmail::send_email;

pub async fn send_confirmation_email(
    to_email: &str,
    username: &str,
    code: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let subject = "YaMDb confirmation code";
    let body = format!(
        "Hello {username},\n\n\
         Your confirmation code is: {code}\n\n\
         Send it together with your username to /api/v1/auth/token to \
         receive an access token.\n"
    );

    send_email(to_email, subject, body).await
}
