pub mod accounts;
pub mod bridge;
#[cfg(feature = "desktop")]
pub mod commands;
pub mod streaming;

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use std::sync::Arc;
    use tauri::Manager;

    use crate::accounts::JsonAccountStore;
    use crate::commands::StreamingState;

    tauri::Builder::default()
        .plugin(
            tauri_plugin_log::Builder::new()
                .level(log::LevelFilter::Info)
                .build(),
        )
        .setup(|app| {
            let store = JsonAccountStore::in_dir(&app.path().app_data_dir()?);
            log::info!("Resolving accounts from {}", store.path().display());
            let manager = streaming::create_manager(Arc::new(store));
            app.manage(StreamingState(Arc::new(manager)));
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::start_streaming,
            commands::stop_streaming,
            commands::streaming_status
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app, event| {
            if let tauri::RunEvent::Exit = event {
                let state = app.state::<StreamingState>();
                tauri::async_runtime::block_on(state.0.stop_all());
            }
        });
}
