use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::{FutureExt, StreamExt, TryStreamExt, stream};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{Instrument, debug, info, info_span, instrument, trace, warn};

use super::model::{
    AccData, DataType, DeviceInfo, EcgData, ExerciseData, ExerciseEntry, HrData, PpgData,
    PpiData, RecordingInterval, RecordingStatus, SampleType, SdkFeature, SensorSettings,
};
use super::{SdkFuture, SdkObservers, SdkStream, SensorSdk, decode_heart_rate_measurement, gatt};
use crate::error::SdkError;

/// SDK backend that drives the standard GATT services of a strap through `btleplug`.
///
/// Heart rate, battery and device information are supported. Vendor-only
/// operations report [`SdkError::Unsupported`].
#[derive(Debug, Clone)]
pub(crate) struct GattSdk {
    inner: Arc<GattInner>,
}

#[derive(Debug)]
struct GattInner {
    manager: Manager,
    observers: Mutex<Option<SdkObservers>>,
    known: Mutex<HashMap<String, KnownPeripheral>>,
    links: Mutex<HashMap<String, DropGuard>>,
}

#[derive(Debug, Clone)]
struct KnownPeripheral {
    adapter: Adapter,
    peripheral: Peripheral,
    device: DeviceInfo,
}

impl GattSdk {
    /// Creates the real BLE backend.
    pub(crate) async fn new() -> Result<Self, SdkError> {
        let manager = Manager::new().await?;
        Ok(Self {
            inner: Arc::new(GattInner {
                manager,
                observers: Mutex::new(None),
                known: Mutex::new(HashMap::new()),
                links: Mutex::new(HashMap::new()),
            }),
        })
    }

    fn observers(&self) -> Option<SdkObservers> {
        lock(&self.inner.observers).clone()
    }

    fn known(&self, device_id: &str) -> Result<KnownPeripheral, SdkError> {
        lock(&self.inner.known)
            .get(device_id)
            .cloned()
            .ok_or_else(|| SdkError::DeviceNotFound {
                device_id: device_id.to_string(),
            })
    }

    #[instrument(skip(self), level = "trace")]
    async fn adapters(&self) -> Result<Vec<Adapter>, SdkError> {
        let adapters = self.inner.manager.adapters().await?;
        if adapters.is_empty() {
            return Err(SdkError::NoAdapters);
        }
        Ok(adapters)
    }

    /// Starts scanning on every adapter and yields each newly discovered peripheral.
    async fn discovery(self) -> Result<SdkStream<DeviceInfo>, SdkError> {
        let adapters = self.adapters().await?;
        info!(adapter_count = adapters.len(), "starting BLE scan");

        let mut feeds = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            let events = adapter.events().await?;
            adapter.start_scan(ScanFilter::default()).await?;
            let sdk = self.clone();
            feeds.push(
                events
                    .filter_map(move |event| {
                        let sdk = sdk.clone();
                        let adapter = adapter.clone();
                        async move {
                            let CentralEvent::DeviceDiscovered(id) = event else {
                                return None;
                            };
                            match sdk.register(&adapter, &id).await {
                                Ok(device) => device.map(Ok),
                                Err(error) => Some(Err(error)),
                            }
                        }
                    })
                    .boxed(),
            );
        }

        Ok(stream::select_all(feeds).boxed())
    }

    /// Remembers a discovered peripheral so later operations can find it by id.
    async fn register(
        &self,
        adapter: &Adapter,
        id: &PeripheralId,
    ) -> Result<Option<DeviceInfo>, SdkError> {
        let peripheral = adapter.peripheral(id).await?;
        let Some(properties) = peripheral.properties().await? else {
            return Ok(None);
        };

        let device = DeviceInfo::new(
            peripheral.id().to_string(),
            properties.address.to_string(),
            properties.rssi.unwrap_or_default(),
            properties.local_name.unwrap_or_default(),
            true,
        );
        trace!(device_id = device.device_id(), name = device.name(), "discovered peripheral");
        lock(&self.inner.known).insert(
            device.device_id().to_string(),
            KnownPeripheral {
                adapter: adapter.clone(),
                peripheral,
                device: device.clone(),
            },
        );
        Ok(Some(device))
    }

    #[instrument(skip(self, known), level = "debug", fields(device_id = known.device.device_id()))]
    async fn establish(self, known: KnownPeripheral) -> Result<(), SdkError> {
        let KnownPeripheral {
            adapter,
            peripheral,
            device,
        } = known;
        let observers = self.observers();
        if let Some(observers) = &observers {
            observers.connection.device_connecting(&device);
        }

        if let Err(error) = adapter.stop_scan().await {
            debug!(?error, "failed to stop adapter scan cleanly");
        }
        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        peripheral.discover_services().await?;
        info!("connected to peripheral");

        self.watch_link(&adapter, &peripheral, &device).await?;
        let Some(observers) = observers else {
            return Ok(());
        };
        observers.connection.device_connected(&device);

        let device_id = device.device_id();
        let characteristics = peripheral.characteristics();
        if let Some(battery) = find(&characteristics, gatt::BATTERY_LEVEL) {
            match peripheral.read(battery).await {
                Ok(value) => {
                    if let Some(level) = value.first() {
                        observers
                            .device_info
                            .battery_level_received(device_id, *level);
                    }
                    observers
                        .features
                        .ble_sdk_feature_ready(device_id, SdkFeature::BatteryInfo);
                }
                Err(error) => warn!(?error, "failed to read battery level"),
            }
        }

        let mut reported_information = false;
        for uuid in gatt::DEVICE_INFORMATION {
            let Some(characteristic) = find(&characteristics, uuid) else {
                continue;
            };
            match peripheral.read(characteristic).await {
                Ok(value) => {
                    trace!(%uuid, payload = %hex::encode(&value), "device information");
                    let text = String::from_utf8_lossy(&value);
                    observers.device_info.dis_information_received(
                        device_id,
                        uuid,
                        text.trim_end_matches('\0'),
                    );
                    reported_information = true;
                }
                Err(error) => warn!(%uuid, ?error, "failed to read device information"),
            }
        }
        if reported_information {
            observers
                .features
                .ble_sdk_feature_ready(device_id, SdkFeature::DeviceInfo);
        }

        if find(&characteristics, gatt::HEART_RATE_MEASUREMENT).is_some() {
            observers
                .features
                .ble_sdk_feature_ready(device_id, SdkFeature::Hr);
        }
        Ok(())
    }

    /// Reports the disconnected callback when the adapter loses the link.
    async fn watch_link(
        &self,
        adapter: &Adapter,
        peripheral: &Peripheral,
        device: &DeviceInfo,
    ) -> Result<(), SdkError> {
        let mut events = adapter.events().await?;
        let cancel = CancellationToken::new();
        lock(&self.inner.links).insert(
            device.device_id().to_string(),
            cancel.clone().drop_guard(),
        );

        let sdk = self.clone();
        let id = peripheral.id();
        let device = device.clone();
        let span = info_span!("link", device_id = %device.device_id());
        tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        event = events.next() => match event {
                            Some(CentralEvent::DeviceDisconnected(lost)) if lost == id => {
                                info!("link lost");
                                lock(&sdk.inner.links).remove(device.device_id());
                                if let Some(observers) = sdk.observers() {
                                    observers.connection.device_disconnected(&device);
                                }
                                break;
                            }
                            Some(_) => {}
                            None => break,
                        },
                    }
                }
            }
            .instrument(span),
        );
        Ok(())
    }

    async fn heart_rate_notifications(
        self,
        device_id: String,
    ) -> Result<SdkStream<HrData>, SdkError> {
        let KnownPeripheral { peripheral, .. } = self.known(&device_id)?;
        if !peripheral.is_connected().await? {
            return Err(SdkError::NotConnected { device_id });
        }
        let characteristic = find(&peripheral.characteristics(), gatt::HEART_RATE_MEASUREMENT)
            .cloned()
            .ok_or_else(|| SdkError::MissingCharacteristic {
                device_id: device_id.clone(),
                name: "heart rate measurement",
            })?;

        let notifications = peripheral.notifications().await?;
        peripheral.subscribe(&characteristic).await?;
        debug!(%device_id, "subscribed to heart rate notifications");
        let span = info_span!("hr_unsubscribe", %device_id);
        let unsubscribe = async move {
            match peripheral.unsubscribe(&characteristic).await {
                Ok(()) => debug!("unsubscribed from heart rate notifications"),
                Err(error) => debug!(?error, "failed to unsubscribe from heart rate notifications"),
            }
        }
        .instrument(span);

        let stream = notifications
            .filter(|notification| {
                futures::future::ready(notification.uuid == gatt::HEART_RATE_MEASUREMENT)
            })
            .filter_map(move |notification| {
                trace!(payload = %hex::encode(&notification.value), "heart rate notification");
                let batch = match decode_heart_rate_measurement(&notification.value) {
                    Ok(sample) => Some(Ok(HrData {
                        samples: vec![sample],
                    })),
                    Err(error) => {
                        warn!(%device_id, %error, "skipping malformed heart rate notification");
                        None
                    }
                };
                futures::future::ready(batch)
            });

        Ok(cleanup_on_drop(stream.boxed(), unsubscribe))
    }
}

impl SensorSdk for GattSdk {
    fn set_observers(&self, observers: SdkObservers) {
        *lock(&self.inner.observers) = Some(observers);
    }

    fn search_for_device(&self) -> SdkStream<DeviceInfo> {
        stream::once(self.clone().discovery())
            .try_flatten()
            .boxed()
    }

    fn start_auto_connect_to_device(&self, _rssi: i16, _device_type: &str) -> SdkFuture<()> {
        unsupported("start_auto_connect_to_device")
    }

    #[instrument(skip(self), level = "debug")]
    fn connect_to_device(&self, device_id: &str) -> Result<(), SdkError> {
        let known = self.known(device_id)?;
        let sdk = self.clone();
        tokio::spawn(async move {
            let device = known.device.clone();
            if let Err(error) = sdk.clone().establish(known).await {
                warn!(%error, "connection attempt failed");
                if let Some(observers) = sdk.observers() {
                    observers.logger.message(&format!("connection failed: {error}"));
                    observers.connection.device_disconnected(&device);
                }
            }
        });
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn disconnect_from_device(&self, device_id: &str) -> Result<(), SdkError> {
        let KnownPeripheral {
            peripheral, device, ..
        } = self.known(device_id)?;
        lock(&self.inner.links).remove(device_id);
        let sdk = self.clone();
        tokio::spawn(async move {
            match peripheral.disconnect().await {
                Ok(()) => {
                    if let Some(observers) = sdk.observers() {
                        observers.connection.device_disconnected(&device);
                    }
                }
                Err(error) => warn!(?error, "disconnect failed"),
            }
        });
        Ok(())
    }

    fn available_online_stream_data_types(
        &self,
        _device_id: &str,
    ) -> SdkFuture<BTreeSet<DataType>> {
        unsupported("available_online_stream_data_types")
    }

    fn request_stream_settings(
        &self,
        _device_id: &str,
        _data_type: DataType,
    ) -> SdkFuture<SensorSettings> {
        unsupported("request_stream_settings")
    }

    fn start_hr_streaming(&self, device_id: &str) -> SdkStream<HrData> {
        stream::once(self.clone().heart_rate_notifications(device_id.to_string()))
            .try_flatten()
            .boxed()
    }

    fn start_ecg_streaming(
        &self,
        _device_id: &str,
        _settings: SensorSettings,
    ) -> SdkStream<EcgData> {
        unsupported_stream("start_ecg_streaming")
    }

    fn start_acc_streaming(
        &self,
        _device_id: &str,
        _settings: SensorSettings,
    ) -> SdkStream<AccData> {
        unsupported_stream("start_acc_streaming")
    }

    fn start_ppg_streaming(
        &self,
        _device_id: &str,
        _settings: SensorSettings,
    ) -> SdkStream<PpgData> {
        unsupported_stream("start_ppg_streaming")
    }

    fn start_ppi_streaming(&self, _device_id: &str) -> SdkStream<PpiData> {
        unsupported_stream("start_ppi_streaming")
    }

    fn request_recording_status(&self, _device_id: &str) -> SdkFuture<RecordingStatus> {
        unsupported("request_recording_status")
    }

    fn start_recording(
        &self,
        _device_id: &str,
        _exercise_id: &str,
        _interval: RecordingInterval,
        _sample_type: SampleType,
    ) -> SdkFuture<()> {
        unsupported("start_recording")
    }

    fn stop_recording(&self, _device_id: &str) -> SdkFuture<()> {
        unsupported("stop_recording")
    }

    fn list_exercises(&self, _device_id: &str) -> SdkStream<ExerciseEntry> {
        unsupported_stream("list_exercises")
    }

    fn fetch_exercise(&self, _device_id: &str, _entry: &ExerciseEntry) -> SdkFuture<ExerciseData> {
        unsupported("fetch_exercise")
    }

    fn remove_exercise(&self, _device_id: &str, _entry: &ExerciseEntry) -> SdkFuture<()> {
        unsupported("remove_exercise")
    }

    fn foreground_entered(&self) {
        debug!("foreground entered; nothing to resume");
    }

    #[instrument(skip(self), level = "debug")]
    fn shut_down(&self) -> SdkFuture<()> {
        lock(&self.inner.links).clear();
        let peripherals: Vec<Peripheral> = lock(&self.inner.known)
            .drain()
            .map(|(_, known)| known.peripheral)
            .collect();
        async move {
            for peripheral in peripherals {
                match peripheral.is_connected().await {
                    Ok(true) => {
                        if let Err(error) = peripheral.disconnect().await {
                            debug!(?error, "failed to disconnect during shutdown");
                        }
                    }
                    Ok(false) => {}
                    Err(error) => debug!(?error, "failed to query link during shutdown"),
                }
            }
            Ok(())
        }
        .instrument(info_span!("gatt_shutdown"))
        .boxed()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn find(characteristics: &BTreeSet<Characteristic>, uuid: uuid::Uuid) -> Option<&Characteristic> {
    characteristics
        .iter()
        .find(|characteristic| characteristic.uuid == uuid)
}

/// Runs `cleanup` once the returned stream is dropped.
fn cleanup_on_drop<T, F>(stream: SdkStream<T>, cleanup: F) -> SdkStream<T>
where
    T: Send + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let dropped = CancellationToken::new();
    let guard = dropped.clone().drop_guard();
    tokio::spawn(async move {
        dropped.cancelled().await;
        cleanup.await;
    });
    stream
        .map(move |item| {
            let _cleanup_when_dropped = &guard;
            item
        })
        .boxed()
}

fn unsupported<T: Send + 'static>(operation: &'static str) -> SdkFuture<T> {
    async move { Err(SdkError::Unsupported { operation }) }.boxed()
}

fn unsupported_stream<T: Send + 'static>(operation: &'static str) -> SdkStream<T> {
    stream::once(async move { Err(SdkError::Unsupported { operation }) }).boxed()
}
