#[macro_export]
macro_rules! device_contract_tests_for {
      (
          $mod_name:ident,
          make = $make:expr,
          tests = {
            $( $test_name:ident => $tmpl:path ),+ $(,)?
        }
      ) => {
          mod $mod_name {
              use super::*;

              $(
                  #[tokio::test]
                  async fn $test_name() {
                      let device = ($make)();
                      $tmpl(device).await;
                  }
              )+
          }
      };
  }

pub mod device_contract {
    use crate::model::{sha256, KeyHandle, StatusCode};
    use crate::ports::DeviceHandle;

    pub(crate) async fn test_version_is_reported(device: impl DeviceHandle) {
        let version = device.version().await.expect("version query failed");
        assert!(!version.is_empty());
    }

    pub(crate) async fn test_sign_foreign_key_handle_is_wrong_data(device: impl DeviceHandle) {
        let result = device
            .sign(
                &sha256(b"challenge"),
                &sha256(b"https://example.com"),
                &KeyHandle::from(vec![0xee; 64]),
                false,
            )
            .await;

        assert_eq!(result.unwrap_err(), StatusCode::WrongData);
    }

    pub(crate) async fn test_close_when_idle_returns(device: impl DeviceHandle) {
        device.close_when_idle().await;
    }

    pub(crate) async fn test_closed_handle_is_gone(device: impl DeviceHandle) {
        device.close_when_idle().await;

        let result = device
            .sign(
                &sha256(b"challenge"),
                &sha256(b"https://example.com"),
                &KeyHandle::from(vec![0xee; 64]),
                false,
            )
            .await;

        assert_eq!(result.unwrap_err(), StatusCode::Gone);
    }
}
