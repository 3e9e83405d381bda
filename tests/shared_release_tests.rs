//! Tests for shared release through the non-cached handle

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use poolbridge::{
        BridgeConfig, BufferMain, BufferMainConfigBuilder, HandleId, IovaMode, NoDevices,
        ObjectRef, PoolBridge, PoolBridgeError, PoolVariant, EXT_HEADER_SIZE,
    };

    const CACHED: HandleId = HandleId::new(0, PoolVariant::Cached);
    const NON_CACHED: HandleId = HandleId::new(0, PoolVariant::NonCached);

    fn bridge(count: u32) -> PoolBridge {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = BufferMainConfigBuilder::new()
            .partition("default", count)
            .ext_header_size(EXT_HEADER_SIZE)
            .build()
            .unwrap();
        let bm = Arc::new(BufferMain::new(config).unwrap());
        PoolBridge::new(bm, BridgeConfig::new().with_iova_mode(IovaMode::Va), &NoDevices).unwrap()
    }

    fn available(bridge: &PoolBridge) -> usize {
        bridge.partition(0).unwrap().available()
    }

    #[test]
    fn test_freed_on_last_reference() {
        let bridge = bridge(8);
        let template = *bridge.partition(0).unwrap().template();
        let cached = bridge.cached(0).unwrap().id();

        let mut objs = [ObjectRef::NULL; 1];
        bridge.dequeue(CACHED, &mut objs).unwrap();
        let obj = objs[0];
        assert_eq!(bridge.buffer_header(0, obj).unwrap().add_ref(2), 3);
        assert_eq!(available(&bridge), 7);

        // Hand the object to the non-cached handle, as a sender of shared
        // buffers does
        let view = bridge.objects(0).unwrap();
        let bi = view.index_of(obj).unwrap();
        // SAFETY: no other reference to the native object is live
        unsafe { view.native_mut(bi) }.unwrap().pool = NON_CACHED;

        bridge.enqueue(NON_CACHED, &[obj]).unwrap();
        assert_eq!(bridge.buffer_header(0, obj).unwrap().ref_count(), 2);
        assert_eq!(bridge.native_object(0, obj).unwrap().pool, NON_CACHED);
        assert_eq!(available(&bridge), 7);

        bridge.enqueue(NON_CACHED, &[obj]).unwrap();
        assert_eq!(bridge.buffer_header(0, obj).unwrap().ref_count(), 1);
        assert_eq!(bridge.native_object(0, obj).unwrap().pool, NON_CACHED);
        assert_eq!(available(&bridge), 7);

        bridge.enqueue(NON_CACHED, &[obj]).unwrap();
        assert_eq!(available(&bridge), 8);
        let header = bridge.buffer_header(0, obj).unwrap();
        assert!(template.matches(header));
        assert_eq!(bridge.native_object(0, obj).unwrap().pool, cached);

        let stats = bridge.stats(0).unwrap();
        assert_eq!(stats.shared_releases, 3);
        assert_eq!(stats.shared_frees, 1);
    }

    #[test]
    fn test_release_with_foreign_object_drops_no_reference() {
        let bridge = bridge(16);

        let mut objs = vec![ObjectRef::NULL; 6];
        bridge.dequeue(CACHED, &mut objs).unwrap();
        assert_eq!(available(&bridge), 10);

        let held = objs[..5].to_vec();
        objs[5] = ObjectRef::from_address(0x40);
        let err = bridge.enqueue(NON_CACHED, &objs).unwrap_err();
        assert!(matches!(err, PoolBridgeError::InvalidObject { partition: 0, address: 0x40 }));

        assert_eq!(available(&bridge), 10);
        for &obj in &held {
            assert_eq!(bridge.buffer_header(0, obj).unwrap().ref_count(), 1);
        }
        let stats = bridge.stats(0).unwrap();
        assert_eq!(stats.shared_releases, 0);
        assert_eq!(stats.shared_frees, 0);

        bridge.enqueue(NON_CACHED, &held).unwrap();
        assert_eq!(available(&bridge), 15);
    }

    #[test]
    fn test_exclusive_objects_freed_immediately() {
        let bridge = bridge(16);

        // 11 objects: two groups of four plus a remainder of three
        let mut objs = vec![ObjectRef::NULL; 11];
        bridge.dequeue(CACHED, &mut objs).unwrap();
        assert_eq!(available(&bridge), 5);

        bridge.enqueue(NON_CACHED, &objs).unwrap();
        assert_eq!(available(&bridge), 16);
        assert_eq!(bridge.stats(0).unwrap().shared_frees, 11);
    }

    #[test]
    fn test_mixed_reference_counts() {
        let bridge = bridge(16);

        let mut objs = vec![ObjectRef::NULL; 6];
        bridge.dequeue(CACHED, &mut objs).unwrap();
        // Even positions are still referenced elsewhere
        for &obj in objs.iter().step_by(2) {
            bridge.buffer_header(0, obj).unwrap().add_ref(1);
        }

        bridge.enqueue(NON_CACHED, &objs).unwrap();
        assert_eq!(available(&bridge), 10 + 3);
        for &obj in objs.iter().step_by(2) {
            assert_eq!(bridge.buffer_header(0, obj).unwrap().ref_count(), 1);
        }

        // The survivors are exclusive again and go back through the cached path
        let survivors: Vec<ObjectRef> = objs.iter().step_by(2).copied().collect();
        bridge.enqueue(CACHED, &survivors).unwrap();
        assert_eq!(available(&bridge), 16);
    }

    #[test]
    fn test_concurrent_release_frees_exactly_once() {
        const THREADS: usize = 4;
        const OBJECTS: usize = 64;

        let bridge = bridge(OBJECTS as u32);
        let mut objs = vec![ObjectRef::NULL; OBJECTS];
        bridge.dequeue(CACHED, &mut objs).unwrap();
        for &obj in &objs {
            bridge
                .buffer_header(0, obj)
                .unwrap()
                .add_ref((THREADS - 1) as u8);
        }
        assert_eq!(available(&bridge), 0);

        thread::scope(|s| {
            for t in 0..THREADS {
                let bridge = &bridge;
                let objs = &objs;
                s.spawn(move || {
                    // Each thread walks the objects in a different order
                    let mut mine = objs.clone();
                    mine.rotate_left(t * OBJECTS / THREADS);
                    for chunk in mine.chunks(7) {
                        bridge.enqueue(NON_CACHED, chunk).unwrap();
                    }
                });
            }
        });

        assert_eq!(available(&bridge), OBJECTS);
        let stats = bridge.stats(0).unwrap();
        assert_eq!(stats.shared_releases, (THREADS * OBJECTS) as u64);
        assert_eq!(stats.shared_frees, OBJECTS as u64);

        let template = bridge.partition(0).unwrap().template();
        for &obj in &objs {
            assert!(template.matches(bridge.buffer_header(0, obj).unwrap()));
        }
    }

    #[test]
    fn test_count_forwarded_to_cached() {
        let bridge = bridge(8);
        let cached = bridge.count(CACHED).unwrap();
        assert_eq!(bridge.count(NON_CACHED).unwrap(), cached);
    }
}
