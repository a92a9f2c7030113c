use crate::{error, info, success, warning};

pub async fn auth() {
    let sync = super::load_synchronizer().await;

    let request = match sync.begin_authorization().await {
        Ok(request) => request,
        Err(e) => error!("Cannot start authorization. Err: {}", e),
    };

    info!("Redirect URI: {}", request.redirect_uri);
    if webbrowser::open(&request.url).is_err() {
        warning!("Cannot open a browser. Open this URL manually:");
    }
    println!("{}", request.url);

    let pb = super::spinner("Waiting for Spotify to redirect back...");
    let result = request.wait().await;
    pb.finish_and_clear();

    match result {
        Ok(()) => success!("Authorized with Spotify"),
        Err(e) => error!("Authorization failed. Err: {}", e),
    }
}
