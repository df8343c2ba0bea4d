mod app;
mod renderer;
mod utils;

use app::App;
use log::error;
use simple_logger::SimpleLogger;
use utils::GameInfo;

fn main() {
    SimpleLogger::new().init().unwrap();

    let game_info = GameInfo {
        app_name: c"Hello Triangle",
        major: 1,
        minor: 0,
        patch: 0,
    };

    let mut app = App::new(game_info);

    // every setup failure bubbles up here; nothing is retried
    if let Err(error) = app.start() {
        error!("Renderer setup failed: {error}");
        std::process::exit(1);
    }
}
